//! Wallet management module
//!
//! The wallet is the fee payer of every transaction. Its signature is implicit
//! in every batch, so it is modelled as a signer that may also refuse.

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by a wallet while signing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// The user (or device) declined the request
    #[error("signing request rejected: {0}")]
    Rejected(String),

    /// The wallet could not be reached
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
}

/// A fee-payer wallet able to sign serialized messages
///
/// Signing may wait on external approval; callers must not issue concurrent
/// requests against the same wallet session.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Public key of the wallet (fee payer)
    fn pubkey(&self) -> Pubkey;

    /// Sign the serialized message bytes
    async fn sign_message(&self, message: &[u8]) -> Result<Signature, WalletError>;
}

/// Local keypair wallet
pub struct WalletManager {
    keypair: Arc<Keypair>,
}

impl WalletManager {
    /// Create a new wallet manager from a keypair file
    ///
    /// A leading `~/` is resolved against `$HOME`.
    pub fn from_file(path: &str) -> Result<Self> {
        let path = match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
            (Some(rest), Some(home)) => std::path::Path::new(&home).join(rest),
            _ => std::path::PathBuf::from(path),
        };
        let keypair_bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read keypair file: {}", path.display()))?;

        let keypair = if keypair_bytes.len() == 64 {
            // Raw bytes format - validate before conversion
            if keypair_bytes.iter().all(|&b| b == 0) {
                anyhow::bail!("Invalid keypair: all-zero key rejected");
            }
            Keypair::try_from(keypair_bytes.as_slice()).context("Invalid keypair bytes")?
        } else {
            // JSON format (solana-keygen output)
            let json: Vec<u8> = serde_json::from_slice(&keypair_bytes)
                .context("Failed to parse keypair JSON")?;
            if json.len() != 64 {
                anyhow::bail!(
                    "Invalid keypair length: expected 64 bytes, got {}",
                    json.len()
                );
            }
            if json.iter().all(|&b| b == 0) {
                anyhow::bail!("Invalid keypair: all-zero key rejected");
            }
            Keypair::try_from(json.as_slice()).context("Invalid keypair from JSON")?
        };

        Ok(Self {
            keypair: Arc::new(keypair),
        })
    }

    /// Create a new wallet manager from a keypair
    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Get the public key
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Get an Arc reference to the keypair
    pub fn keypair_arc(&self) -> Arc<Keypair> {
        Arc::clone(&self.keypair)
    }
}

impl std::fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletManager")
            .field("pubkey", &self.keypair.pubkey())
            .finish_non_exhaustive()
    }
}

impl Clone for WalletManager {
    fn clone(&self) -> Self {
        Self {
            keypair: Arc::clone(&self.keypair),
        }
    }
}

#[async_trait]
impl WalletSigner for WalletManager {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, WalletError> {
        self.keypair
            .try_sign_message(message)
            .map_err(|e| WalletError::Unavailable(e.to_string()))
    }
}
