//! Chain provider abstraction and the in-memory chain used for tests
//! and local development.

pub mod client;

use async_trait::async_trait;
use chrono::Utc;
use ledger_contract::{ContractError, LedgerContract, OpReceipt, SignedOperation};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

use crate::errors::{EngineError, Result};

pub use client::ChainClient;

/// Opaque transaction reference assigned at submission time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxRef(String);

impl TxRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn generate() -> Self {
        Self(format!("0x{}", Uuid::now_v7().simple()))
    }
}

impl std::fmt::Display for TxRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settled status of a submitted transaction
#[derive(Debug, Clone)]
pub enum TxStatus {
    /// Executed and included; carries the emitted receipt
    Confirmed { receipt: OpReceipt },
    /// Executed and reverted; the sequence number was still consumed
    Reverted { reason: String },
}

/// Outcome of waiting for finality, including the case where the wait
/// itself failed and the transaction's fate is unknown
#[derive(Debug, Clone)]
pub enum FinalityOutcome {
    Confirmed(OpReceipt),
    Reverted(String),
    /// Deadline elapsed or the provider went away mid-wait; the
    /// transaction may still land
    Unknown,
}

/// Submission path to the chain
///
/// `simulate` is a dry run against current chain state and consumes no
/// sequence number. `submit` consumes the envelope's sequence number
/// whether the transaction confirms or reverts.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Dry-run the operation against current state without submitting
    async fn simulate(&self, op: &SignedOperation) -> Result<()>;

    /// Submit for inclusion; returns a reference usable for lookup
    async fn submit(&self, op: SignedOperation) -> Result<TxRef>;

    /// Block until the transaction settles
    async fn wait_finality(&self, tx_ref: &TxRef) -> Result<TxStatus>;

    /// Query a past transaction; `None` when the chain has no record of it
    async fn lookup(&self, tx_ref: &TxRef) -> Result<Option<TxStatus>>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

struct ChainState {
    contract: LedgerContract,
    /// Sequence the chain will accept next
    next_sequence: u64,
    statuses: HashMap<TxRef, TxStatus>,
    /// Sequences consumed, in submission order
    submitted_sequences: Vec<u64>,
    /// When set, the next submission reverts with this reason
    fail_next: Option<String>,
    /// When set, submissions are refused outright before acceptance
    fee_budget_exhausted: bool,
    /// When set, the next submitted ref is withheld immediately
    withhold_next: bool,
    /// Refs whose status is hidden from finality/lookup until released
    withheld: HashSet<TxRef>,
}

/// Deterministic single-node chain holding a [`LedgerContract`] behind a
/// strict sequence check, with controls for injecting reverts and
/// stranded-finality scenarios.
pub struct InMemoryChain {
    admin_public_key: [u8; 32],
    finality_delay: Duration,
    state: Mutex<ChainState>,
}

impl InMemoryChain {
    pub fn new(admin_public_key: [u8; 32], contract: LedgerContract) -> Self {
        Self {
            admin_public_key,
            finality_delay: Duration::from_millis(10),
            state: Mutex::new(ChainState {
                contract,
                next_sequence: 0,
                statuses: HashMap::new(),
                submitted_sequences: Vec::new(),
                fail_next: None,
                fee_budget_exhausted: false,
                withhold_next: false,
                withheld: HashSet::new(),
            }),
        }
    }

    pub fn with_finality_delay(mut self, delay: Duration) -> Self {
        self.finality_delay = delay;
        self
    }

    fn check_envelope(&self, op: &SignedOperation, expected_sequence: u64) -> Result<()> {
        if !op.verify(&self.admin_public_key) {
            return Err(EngineError::Rejected(ContractError::BadSignature(
                op.caller.clone(),
            )));
        }
        if op.sequence != expected_sequence {
            return Err(EngineError::Rejected(ContractError::BadSequence {
                expected: expected_sequence,
                got: op.sequence,
            }));
        }
        Ok(())
    }

    /// Make the next submitted transaction revert with the given reason
    pub fn fail_next_submission(&self, reason: impl Into<String>) {
        self.state.lock().fail_next = Some(reason.into());
    }

    /// While exhausted, submissions are refused before acceptance and
    /// consume no sequence number
    pub fn set_fee_budget_exhausted(&self, exhausted: bool) {
        self.state.lock().fee_budget_exhausted = exhausted;
    }

    /// Hide the given ref's status until [`release_all`](Self::release_all)
    pub fn withhold(&self, tx_ref: &TxRef) {
        self.state.lock().withheld.insert(tx_ref.clone());
    }

    /// Withhold the next submitted transaction's status as soon as it is
    /// assigned a ref, so its finality wait never resolves
    pub fn withhold_next(&self) {
        self.state.lock().withhold_next = true;
    }

    /// Un-hide every withheld ref
    pub fn release_all(&self) {
        self.state.lock().withheld.clear();
    }

    /// Sequences consumed so far, in submission order
    pub fn submitted_sequences(&self) -> Vec<u64> {
        self.state.lock().submitted_sequences.clone()
    }

    /// Snapshot of the contract state
    pub fn contract_snapshot(&self) -> LedgerContract {
        self.state.lock().contract.clone()
    }
}

#[async_trait]
impl ChainProvider for InMemoryChain {
    async fn simulate(&self, op: &SignedOperation) -> Result<()> {
        let state = self.state.lock();
        self.check_envelope(op, state.next_sequence)?;
        // Dry run on a copy; real chain state is untouched
        let mut scratch = state.contract.clone();
        scratch
            .apply(&op.operation, Utc::now())
            .map_err(EngineError::Rejected)?;
        Ok(())
    }

    async fn submit(&self, op: SignedOperation) -> Result<TxRef> {
        let mut state = self.state.lock();
        self.check_envelope(&op, state.next_sequence)?;
        if state.fee_budget_exhausted {
            return Err(EngineError::FeeBudgetExceeded(
                "submission fee exceeds remaining budget".to_string(),
            ));
        }

        // Accepted: the sequence is consumed regardless of execution outcome
        state.next_sequence += 1;
        state.submitted_sequences.push(op.sequence);

        let tx_ref = TxRef::generate();
        let status = if let Some(reason) = state.fail_next.take() {
            TxStatus::Reverted { reason }
        } else {
            match state.contract.apply(&op.operation, Utc::now()) {
                Ok(receipt) => TxStatus::Confirmed { receipt },
                Err(e) => TxStatus::Reverted {
                    reason: e.to_string(),
                },
            }
        };
        state.statuses.insert(tx_ref.clone(), status);
        if state.withhold_next {
            state.withhold_next = false;
            state.withheld.insert(tx_ref.clone());
        }
        Ok(tx_ref)
    }

    async fn wait_finality(&self, tx_ref: &TxRef) -> Result<TxStatus> {
        tokio::time::sleep(self.finality_delay).await;
        loop {
            {
                let state = self.state.lock();
                if !state.withheld.contains(tx_ref) {
                    if let Some(status) = state.statuses.get(tx_ref) {
                        return Ok(status.clone());
                    }
                    return Err(EngineError::ProviderUnavailable(format!(
                        "unknown transaction {}",
                        tx_ref
                    )));
                }
            }
            // Withheld: keep polling until released or the caller times out
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn lookup(&self, tx_ref: &TxRef) -> Result<Option<TxStatus>> {
        let state = self.state.lock();
        if state.withheld.contains(tx_ref) {
            return Ok(None);
        }
        Ok(state.statuses.get(tx_ref).cloned())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_contract::{AdminKeypair, ChainOperation, ContractParams};

    fn setup() -> (AdminKeypair, InMemoryChain) {
        let keypair = AdminKeypair::generate();
        let contract = LedgerContract::new(keypair.address(), ContractParams::default());
        let chain = InMemoryChain::new(keypair.public_key(), contract)
            .with_finality_delay(Duration::from_millis(1));
        (keypair, chain)
    }

    fn register_op(keypair: &AdminKeypair, sequence: u64) -> SignedOperation {
        keypair.sign_operation(
            sequence,
            ChainOperation::RegisterCharity {
                wallet: ledger_contract::Address::new("0xcharity"),
                name: "Clean Water".into(),
                metadata_ref: "ipfs://meta".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_submit_confirms_and_consumes_sequence() {
        let (keypair, chain) = setup();
        let tx_ref = chain.submit(register_op(&keypair, 0)).await.unwrap();
        match chain.wait_finality(&tx_ref).await.unwrap() {
            TxStatus::Confirmed { receipt } => {
                assert_eq!(receipt, OpReceipt::CharityRegistered { charity_id: 1 });
            }
            TxStatus::Reverted { reason } => panic!("unexpected revert: {}", reason),
        }
        assert_eq!(chain.submitted_sequences(), vec![0]);
    }

    #[tokio::test]
    async fn test_stale_sequence_rejected_without_consumption() {
        let (keypair, chain) = setup();
        chain.submit(register_op(&keypair, 0)).await.unwrap();
        let err = chain.submit(register_op(&keypair, 0)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Rejected(ContractError::BadSequence { expected: 1, got: 0 })
        ));
        assert_eq!(chain.submitted_sequences(), vec![0]);
    }

    #[tokio::test]
    async fn test_simulate_consumes_nothing() {
        let (keypair, chain) = setup();
        chain.simulate(&register_op(&keypair, 0)).await.unwrap();
        chain.simulate(&register_op(&keypair, 0)).await.unwrap();
        assert!(chain.submitted_sequences().is_empty());
        assert!(chain.contract_snapshot().charity(1).is_err());
    }

    #[tokio::test]
    async fn test_injected_revert_still_consumes_sequence() {
        let (keypair, chain) = setup();
        chain.fail_next_submission("out of gas");
        let tx_ref = chain.submit(register_op(&keypair, 0)).await.unwrap();
        match chain.wait_finality(&tx_ref).await.unwrap() {
            TxStatus::Reverted { reason } => assert_eq!(reason, "out of gas"),
            TxStatus::Confirmed { .. } => panic!("expected revert"),
        }
        // Next submission must use the successor sequence
        chain.submit(register_op(&keypair, 1)).await.unwrap();
        assert_eq!(chain.submitted_sequences(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_exhausted_fee_budget_refuses_without_consumption() {
        let (keypair, chain) = setup();
        chain.set_fee_budget_exhausted(true);
        let err = chain.submit(register_op(&keypair, 0)).await.unwrap_err();
        assert!(matches!(err, EngineError::FeeBudgetExceeded(_)));
        assert!(chain.submitted_sequences().is_empty());

        // Once the budget recovers, the same sequence is still valid.
        chain.set_fee_budget_exhausted(false);
        chain.submit(register_op(&keypair, 0)).await.unwrap();
        assert_eq!(chain.submitted_sequences(), vec![0]);
    }

    #[tokio::test]
    async fn test_withheld_ref_invisible_until_released() {
        let (keypair, chain) = setup();
        let tx_ref = chain.submit(register_op(&keypair, 0)).await.unwrap();
        chain.withhold(&tx_ref);
        assert!(chain.lookup(&tx_ref).await.unwrap().is_none());
        chain.release_all();
        assert!(chain.lookup(&tx_ref).await.unwrap().is_some());
    }
}
