//! Solana JSON-RPC implementation of [`ChainTransport`]
//!
//! - Read-only calls (checkpoint fetch) retry with jittered exponential
//!   backoff when the error is classified retryable
//! - Sends are issued exactly once; resubmission is a caller decision
//! - Every request passes through a shared rate limiter

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, signature::Signature,
    transaction::VersionedTransaction,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, instrument, warn};

use crate::config::{parse_commitment, ConfigError, RpcConfig};
use crate::rpc_manager::rpc_errors::{custom_error_code, TransportError};
use crate::submission::{ChainTransport, SignatureState, SimulationReport};

/// JSON-RPC chain transport
pub struct RpcTransport {
    client: Arc<RpcClient>,
    endpoint: String,
    commitment: CommitmentConfig,
    limiter: DefaultDirectRateLimiter,
    max_retries: usize,
    skip_node_preflight: bool,
}

impl std::fmt::Debug for RpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcTransport")
            .field("endpoint", &self.endpoint)
            .field("commitment", &self.commitment)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl RpcTransport {
    /// Create a transport from the `[rpc]` section
    ///
    /// `skip_node_preflight` should be set when the engine simulates on its
    /// own, so the node does not simulate the same transaction twice.
    pub fn from_config(config: &RpcConfig, skip_node_preflight: bool) -> Result<Self, ConfigError> {
        let commitment = parse_commitment(&config.commitment)?;
        let client = RpcClient::new_with_timeout_and_commitment(
            config.endpoint.clone(),
            Duration::from_secs(config.timeout_secs),
            commitment,
        );
        let rps = NonZeroU32::new(config.rate_limit_rps).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client: Arc::new(client),
            endpoint: config.endpoint.clone(),
            commitment,
            limiter: RateLimiter::direct(Quota::per_second(rps)),
            max_retries: config.max_retries as usize,
            skip_node_preflight,
        })
    }

    /// Shared client for read-only collaborators (resolver, asset discovery)
    pub fn client(&self) -> Arc<RpcClient> {
        Arc::clone(&self.client)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn commitment(&self) -> CommitmentConfig {
        self.commitment
    }

    async fn throttle(&self) {
        self.limiter.until_ready().await;
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(50)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(self.max_retries)
    }
}

#[async_trait]
impl ChainTransport for RpcTransport {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn latest_checkpoint(&self) -> Result<Hash, TransportError> {
        RetryIf::spawn(
            self.retry_strategy(),
            || async {
                self.throttle().await;
                self.client.get_latest_blockhash().await.map_err(|e| {
                    let err = TransportError::from_client_error(e, &self.endpoint);
                    warn!(error = %err, "Checkpoint fetch failed");
                    err
                })
            },
            |err: &TransportError| err.is_retryable(),
        )
        .await
    }

    #[instrument(skip(self, tx), fields(endpoint = %self.endpoint))]
    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationReport, TransportError> {
        self.throttle().await;
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: false,
            commitment: Some(self.commitment),
            ..RpcSimulateTransactionConfig::default()
        };
        let response = self
            .client
            .simulate_transaction_with_config(tx, config)
            .await
            .map_err(|e| TransportError::from_client_error(e, &self.endpoint))?;

        let result = response.value;
        let report = SimulationReport {
            err: result.err.map(|e| format!("{:?}", e)),
            logs: result.logs.unwrap_or_default(),
            units_consumed: result.units_consumed,
        };
        debug!(
            ok = report.succeeded(),
            units = ?report.units_consumed,
            "Simulation finished"
        );
        Ok(report)
    }

    #[instrument(skip(self, tx), fields(endpoint = %self.endpoint))]
    async fn send_raw(&self, tx: &VersionedTransaction) -> Result<Signature, TransportError> {
        self.throttle().await;
        let config = RpcSendTransactionConfig {
            skip_preflight: self.skip_node_preflight,
            preflight_commitment: Some(self.commitment.commitment),
            // The node must not rebroadcast on its own; resubmission is explicit
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };
        self.client
            .send_transaction_with_config(tx, config)
            .await
            .map_err(|e| TransportError::from_client_error(e, &self.endpoint))
    }

    async fn signature_state(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureState>, TransportError> {
        self.throttle().await;
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| TransportError::from_client_error(e, &self.endpoint))?;

        let state = response.value.into_iter().next().flatten().map(|status| {
            if let Some(err) = &status.err {
                let detail = format!("{:?}", err);
                SignatureState::Failed {
                    code: custom_error_code(&detail),
                    detail,
                }
            } else if status.satisfies_commitment(self.commitment) {
                SignatureState::Confirmed
            } else {
                SignatureState::Processing
            }
        });
        Ok(state)
    }
}
