//! Signing client owning the administrative credential and its sequence
//! counter. Exactly one instance exists, inside the sequencer worker, so
//! the counter never races.

use ledger_contract::{AdminKeypair, ChainOperation, ContractError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ChainProvider, FinalityOutcome, TxRef};
use crate::errors::{EngineError, Result};

pub struct ChainClient<P: ChainProvider> {
    provider: Arc<P>,
    keypair: AdminKeypair,
    /// Next sequence to sign with; advanced only when an envelope is
    /// actually handed to the provider
    sequence: u64,
    finality_deadline: Duration,
}

impl<P: ChainProvider> ChainClient<P> {
    pub fn new(provider: Arc<P>, keypair: AdminKeypair, finality_deadline: Duration) -> Self {
        Self {
            provider,
            keypair,
            sequence: 0,
            finality_deadline,
        }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Sign, simulate, and submit one operation.
    ///
    /// The sequence advances only when the provider accepts the envelope:
    /// an accepted transaction consumes its number even if it later
    /// reverts, while a simulation rejection or an outright submission
    /// refusal (fee budget, provider down) consumes nothing and leaves
    /// the counter aligned with the chain.
    pub async fn submit(&mut self, operation: ChainOperation) -> Result<TxRef> {
        let signed = self.keypair.sign_operation(self.sequence, operation);

        if let Err(e) = self.provider.simulate(&signed).await {
            debug!(
                kind = signed.operation.kind(),
                sequence = signed.sequence,
                error = %e,
                "Simulation rejected operation"
            );
            return Err(classify_credential(e));
        }

        let tx_ref = self
            .provider
            .submit(signed)
            .await
            .map_err(classify_credential)?;
        self.sequence += 1;
        debug!(tx_ref = %tx_ref, sequence = self.sequence - 1, "Submitted operation");
        Ok(tx_ref)
    }

    /// Wait for the transaction to settle, bounded by the configured
    /// deadline. Every failure mode collapses to `Unknown`: the
    /// transaction may still land, so the caller must not treat it as
    /// failed.
    pub async fn wait_finality(&self, tx_ref: &TxRef) -> FinalityOutcome {
        match tokio::time::timeout(self.finality_deadline, self.provider.wait_finality(tx_ref))
            .await
        {
            Ok(Ok(super::TxStatus::Confirmed { receipt })) => FinalityOutcome::Confirmed(receipt),
            Ok(Ok(super::TxStatus::Reverted { reason })) => FinalityOutcome::Reverted(reason),
            Ok(Err(e)) => {
                warn!(tx_ref = %tx_ref, error = %e, "Finality wait failed, outcome unknown");
                FinalityOutcome::Unknown
            }
            Err(_) => {
                warn!(tx_ref = %tx_ref, "Finality deadline elapsed, outcome unknown");
                FinalityOutcome::Unknown
            }
        }
    }
}

/// A signature or sequence rejection means the credential's local view
/// diverged from the chain; continuing would submit out of order.
fn classify_credential(e: EngineError) -> EngineError {
    match e {
        EngineError::Rejected(ContractError::BadSequence { expected, got }) => {
            EngineError::CredentialUnusable(format!(
                "sequence diverged: chain expects {}, local counter at {}",
                expected, got
            ))
        }
        EngineError::Rejected(ContractError::BadSignature(addr)) => {
            EngineError::CredentialUnusable(format!("signature rejected for {}", addr.as_str()))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChain;
    use ledger_contract::{Address, ContractParams, LedgerContract};
    use rust_decimal_macros::dec;

    fn setup() -> (ChainClient<InMemoryChain>, Arc<InMemoryChain>) {
        let keypair = AdminKeypair::generate();
        let contract = LedgerContract::new(keypair.address(), ContractParams::default());
        let chain = Arc::new(
            InMemoryChain::new(keypair.public_key(), contract)
                .with_finality_delay(Duration::from_millis(1)),
        );
        (
            ChainClient::new(chain.clone(), keypair, Duration::from_millis(200)),
            chain,
        )
    }

    fn register_charity() -> ChainOperation {
        ChainOperation::RegisterCharity {
            wallet: Address::new("0xcharity"),
            name: "Shelter Aid".into(),
            metadata_ref: "ipfs://meta".into(),
        }
    }

    #[tokio::test]
    async fn test_sequence_advances_per_submission() {
        let (mut client, chain) = setup();
        client.submit(register_charity()).await.unwrap();
        client.submit(register_charity()).await.unwrap();
        assert_eq!(chain.submitted_sequences(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_simulation_reject_consumes_no_sequence() {
        let (mut client, chain) = setup();
        // Donating to a nonexistent campaign fails in simulation
        let err = client
            .submit(ChainOperation::DonateNative {
                campaign_id: 99,
                donor: Address::new("0xdonor"),
                value: dec!(1),
                fiat_amount_usd: dec!(100),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Rejected(_)));
        assert!(chain.submitted_sequences().is_empty());

        // The counter is intact for the next valid submission
        client.submit(register_charity()).await.unwrap();
        assert_eq!(chain.submitted_sequences(), vec![0]);
    }

    #[tokio::test]
    async fn test_refused_submission_consumes_no_sequence() {
        let (mut client, chain) = setup();
        chain.set_fee_budget_exhausted(true);
        let err = client.submit(register_charity()).await.unwrap_err();
        assert!(matches!(err, EngineError::FeeBudgetExceeded(_)));
        assert!(chain.submitted_sequences().is_empty());

        // The counter must not have run ahead of the chain.
        chain.set_fee_budget_exhausted(false);
        client.submit(register_charity()).await.unwrap();
        client.submit(register_charity()).await.unwrap();
        assert_eq!(chain.submitted_sequences(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_finality_timeout_is_unknown() {
        let (mut client, chain) = setup();
        let tx_ref = client.submit(register_charity()).await.unwrap();
        chain.withhold(&tx_ref);
        assert!(matches!(
            client.wait_finality(&tx_ref).await,
            FinalityOutcome::Unknown
        ));
    }
}
