//! Test Utilities Module
//!
//! Deterministic stand-ins for the network, the wallet and the governance
//! resolver, plus fixture builders for governance accounts.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    account::Account,
    hash::Hash,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::governance::accounts::layout;
use crate::governance::{GovernanceResolver, GovernanceTarget, PipelineError, ResolvedGovernance};
use crate::rpc_manager::TransportError;
use crate::submission::{ChainTransport, SignatureState, SimulationReport};
use crate::tx_builder::InstructionUnit;
use crate::wallet::{WalletError, WalletSigner};

/// Program id carried by [`marker_instruction`]
pub const MARKER_PROGRAM: Pubkey = Pubkey::new_from_array([7u8; 32]);

/// An account-less instruction tagged with one byte, used to steer rules
pub fn marker_instruction(tag: u8) -> InstructionUnit {
    Instruction {
        program_id: MARKER_PROGRAM,
        accounts: vec![],
        data: vec![tag],
    }
    .into()
}

/// Marker tags carried by a transaction, in instruction order
pub fn markers(tx: &VersionedTransaction) -> Vec<u8> {
    let keys = tx.message.static_account_keys();
    tx.message
        .instructions()
        .iter()
        .filter(|ix| keys.get(ix.program_id_index as usize) == Some(&MARKER_PROGRAM))
        .filter_map(|ix| ix.data.first().copied())
        .collect()
}

/// Whether any instruction in `tx` targets `program_id` with first data byte `tag`
pub fn has_instruction(tx: &VersionedTransaction, program_id: &Pubkey, tag: u8) -> bool {
    let keys = tx.message.static_account_keys();
    tx.message.instructions().iter().any(|ix| {
        keys.get(ix.program_id_index as usize) == Some(program_id) && ix.data.first() == Some(&tag)
    })
}

/// Scripted network behaviour for one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Confirm,
    /// Report `Processing` for this many polls, then `Confirmed`
    ConfirmAfterPolls(u32),
    RejectSimulation(String),
    FailSend,
    FailOnChain(Option<u32>),
    /// Accept the send and never report a status
    NeverConfirm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Checkpoint,
    Simulated(Vec<u8>),
    Sent { markers: Vec<u8>, signature: Signature },
    Polled(Signature),
}

type Predicate = Box<dyn Fn(&VersionedTransaction) -> bool + Send + Sync>;

#[derive(Default)]
struct MockState {
    events: Vec<MockEvent>,
    in_flight: HashMap<Signature, (Rule, u32)>,
}

/// In-memory [`ChainTransport`]
///
/// Every transaction confirms on the first poll unless a rule matches it.
/// Rules are checked in insertion order; the first match wins.
#[derive(Default)]
pub struct MockTransport {
    rules: Vec<(Predicate, Rule)>,
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `rule` to transactions carrying marker `tag`
    pub fn with_rule(self, tag: u8, rule: Rule) -> Self {
        self.when(move |tx| markers(tx).contains(&tag), rule)
    }

    /// Apply `rule` to transactions matching `predicate`
    pub fn when<F>(mut self, predicate: F, rule: Rule) -> Self
    where
        F: Fn(&VersionedTransaction) -> bool + Send + Sync + 'static,
    {
        self.rules.push((Box::new(predicate), rule));
        self
    }

    fn rule_for(&self, tx: &VersionedTransaction) -> Rule {
        self.rules
            .iter()
            .find(|(predicate, _)| predicate(tx))
            .map(|(_, rule)| rule.clone())
            .unwrap_or(Rule::Confirm)
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().events.clone()
    }

    /// Markers of every sent transaction, in send order
    pub fn sent_markers(&self) -> Vec<u8> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                MockEvent::Sent { markers, .. } => Some(markers.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|event| matches!(event, MockEvent::Sent { .. }))
            .count()
    }

    fn endpoint_error(message: &str) -> TransportError {
        TransportError::Transport {
            endpoint: "mock".to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ChainTransport for MockTransport {
    async fn latest_checkpoint(&self) -> Result<Hash, TransportError> {
        self.state.lock().events.push(MockEvent::Checkpoint);
        Ok(Hash::new_unique())
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationReport, TransportError> {
        self.state.lock().events.push(MockEvent::Simulated(markers(tx)));
        match self.rule_for(tx) {
            Rule::RejectSimulation(reason) => Ok(SimulationReport {
                err: Some(reason),
                logs: vec!["Program log: simulated failure".to_string()],
                units_consumed: Some(1_000),
            }),
            _ => Ok(SimulationReport {
                err: None,
                logs: vec![],
                units_consumed: Some(1_000),
            }),
        }
    }

    async fn send_raw(&self, tx: &VersionedTransaction) -> Result<Signature, TransportError> {
        let rule = self.rule_for(tx);
        if rule == Rule::FailSend {
            return Err(Self::endpoint_error("connection reset by peer"));
        }
        let signature = tx
            .signatures
            .first()
            .copied()
            .ok_or_else(|| Self::endpoint_error("unsigned transaction"))?;

        let mut state = self.state.lock();
        state.events.push(MockEvent::Sent {
            markers: markers(tx),
            signature,
        });
        state.in_flight.insert(signature, (rule, 0));
        Ok(signature)
    }

    async fn signature_state(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureState>, TransportError> {
        let mut state = self.state.lock();
        state.events.push(MockEvent::Polled(*signature));
        let Some((rule, polls)) = state.in_flight.get_mut(signature) else {
            return Ok(None);
        };
        *polls += 1;
        let status = match rule {
            Rule::ConfirmAfterPolls(n) if *polls <= *n => Some(SignatureState::Processing),
            Rule::FailOnChain(code) => Some(SignatureState::Failed {
                code: *code,
                detail: format!("InstructionError(0, Custom({}))", code.unwrap_or_default()),
            }),
            Rule::NeverConfirm => None,
            _ => Some(SignatureState::Confirmed),
        };
        Ok(status)
    }
}

/// Wallet backed by a throwaway keypair
///
/// Tracks how many signing requests overlap so callers can check that
/// signing is serialized.
pub struct MockWallet {
    keypair: Keypair,
    reject: AtomicBool,
    requests: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    sign_delay: Option<Duration>,
}

impl MockWallet {
    pub fn new() -> Self {
        Self {
            keypair: Keypair::new(),
            reject: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            sign_delay: None,
        }
    }

    /// Hold every signing request open for `delay`, like a user approving it
    pub fn with_sign_delay(mut self, delay: Duration) -> Self {
        self.sign_delay = Some(delay);
        self
    }

    /// A wallet whose user declines every request
    pub fn rejecting() -> Self {
        let wallet = Self::new();
        wallet.reject.store(true, Ordering::SeqCst);
        wallet
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn sign_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Highest number of signing requests observed in progress at once
    pub fn peak_concurrent_signs(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletSigner for MockWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, WalletError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        // Suspend so overlapping requests, if any, get a chance to start
        match self.sign_delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.reject.load(Ordering::SeqCst) {
            return Err(WalletError::Rejected("user declined".to_string()));
        }
        Ok(self.keypair.sign_message(message))
    }
}

fn program_account(program_id: &Pubkey, data: Vec<u8>) -> Account {
    Account {
        lamports: 1_000_000,
        data,
        owner: *program_id,
        executable: false,
        rent_epoch: 0,
    }
}

/// On-chain accounts of a realm with one governance and one member
pub struct GovernanceFixture {
    pub target: GovernanceTarget,
    pub accounts: HashMap<Pubkey, Account>,
}

impl GovernanceFixture {
    /// Realm governed by a community mint, with `proposals_count` proposals so far
    pub fn new(token_owner: Pubkey, proposals_count: u32, min_hold_up_time: u32) -> Self {
        let target = GovernanceTarget {
            program_id: Pubkey::new_unique(),
            realm: Pubkey::new_unique(),
            governance: Pubkey::new_unique(),
            governing_token_mint: Pubkey::new_unique(),
            token_owner,
        };
        let program_id = target.program_id;

        let mut accounts = HashMap::new();
        accounts.insert(
            target.realm,
            program_account(&program_id, layout::realm(&target.governing_token_mint, None)),
        );
        accounts.insert(
            target.governance,
            program_account(
                &program_id,
                layout::governance(&target.realm, proposals_count, min_hold_up_time),
            ),
        );
        accounts.insert(
            target.token_owner_record_address(),
            program_account(
                &program_id,
                layout::token_owner_record(
                    &target.realm,
                    &target.governing_token_mint,
                    &token_owner,
                    1_000_000,
                ),
            ),
        );
        Self { target, accounts }
    }

    pub fn without(mut self, address: &Pubkey) -> Self {
        self.accounts.remove(address);
        self
    }
}

/// Resolver reading from an in-memory account map
pub struct MockResolver {
    accounts: HashMap<Pubkey, Account>,
    resolves: AtomicUsize,
}

impl MockResolver {
    pub fn new(accounts: HashMap<Pubkey, Account>) -> Self {
        Self {
            accounts,
            resolves: AtomicUsize::new(0),
        }
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

impl From<&GovernanceFixture> for MockResolver {
    fn from(fixture: &GovernanceFixture) -> Self {
        Self::new(fixture.accounts.clone())
    }
}

#[async_trait]
impl GovernanceResolver for MockResolver {
    async fn resolve(&self, target: &GovernanceTarget) -> Result<ResolvedGovernance, PipelineError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        ResolvedGovernance::from_accounts(
            target,
            self.accounts.get(&target.realm),
            self.accounts.get(&target.governance),
            self.accounts.get(&target.token_owner_record_address()),
        )
    }
}
