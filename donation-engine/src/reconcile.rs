//! Saga execution: one mirror transaction held open across one chain
//! submission
//!
//! Exactly three exits per saga:
//!   - chain confirmed: the row flips to `Confirmed` and the transaction
//!     commits
//!   - chain reverted or the operation never reached the chain: the
//!     transaction rolls back, leaving no trace
//!   - outcome unknown (finality timeout): the transaction commits with
//!     the row still `Pending` and its tx_ref recorded, and the sweep
//!     resolves it later
//!
//! The sweep and the saga may race on the same row; the `Pending`-guarded
//! updates in the mirror make whichever runs second a no-op.

use chrono::{DateTime, Duration, Utc};
use ledger_contract::{ChainOperation, OpReceipt};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chain::{ChainProvider, FinalityOutcome, TxRef, TxStatus};
use crate::errors::{EngineError, Result};
use crate::metrics::EngineMetrics;
use crate::mirror::{MirrorStore, StagedWrite};
use crate::models::PendingRecord;
use crate::sequencer::SequencerHandle;

/// How a completed saga left the operation
#[derive(Debug, Clone)]
pub enum OpOutcome {
    /// Chain-confirmed; the receipt carries the contract-assigned ids
    Confirmed(OpReceipt),
    /// Outcome unknown at deadline; the mirror row remains `Pending` and
    /// the sweep will settle it
    AcceptedPending,
}

/// Result of one accepted operation
#[derive(Debug, Clone)]
pub struct OpRef {
    /// Mirror row id
    pub record_id: Uuid,
    /// Chain transaction reference, present once submission succeeded
    pub tx_ref: TxRef,
    pub outcome: OpOutcome,
}

/// What one sweep pass resolved
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub confirmed: usize,
    pub failed: usize,
    /// Unlocatable past the grace period, marked `Failed`
    pub expired: usize,
    pub still_pending: usize,
}

pub struct Reconciler<P: ChainProvider> {
    store: MirrorStore,
    sequencer: SequencerHandle,
    provider: Arc<P>,
    metrics: Arc<EngineMetrics>,
    cooldown_secs: i64,
    pending_grace: Duration,
}

impl<P: ChainProvider> Reconciler<P> {
    pub fn new(
        store: MirrorStore,
        sequencer: SequencerHandle,
        provider: Arc<P>,
        metrics: Arc<EngineMetrics>,
        cooldown_secs: i64,
        pending_grace_secs: i64,
    ) -> Self {
        Self {
            store,
            sequencer,
            provider,
            metrics,
            cooldown_secs,
            pending_grace: Duration::seconds(pending_grace_secs),
        }
    }

    /// Stage the write, drive the operation through the sequencer, and
    /// resolve the row according to the chain outcome.
    pub async fn run_saga(&self, write: StagedWrite, operation: ChainOperation) -> Result<OpRef> {
        let kind_label = operation.kind();
        let mut tx = self.store.begin().await?;
        let (kind, record_id) = self.store.stage(&mut tx, &write).await?;

        // Enqueue after staging so a full mailbox costs only a rollback
        let pending = match self.sequencer.enqueue(operation) {
            Ok(pending) => pending,
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };

        let tx_ref = match pending.submitted.await {
            Ok(Ok(tx_ref)) => tx_ref,
            Ok(Err(e)) => {
                tx.rollback().await?;
                return Err(e);
            }
            // Worker dropped the reply channel without answering
            Err(_) => {
                tx.rollback().await?;
                return Err(EngineError::SequencerHalted);
            }
        };
        self.store
            .set_tx_ref(&mut tx, kind, record_id, tx_ref.as_str())
            .await?;

        let outcome = pending.outcome.await.unwrap_or(FinalityOutcome::Unknown);
        match outcome {
            FinalityOutcome::Confirmed(receipt) => {
                self.store
                    .confirm_record(&mut tx, kind, record_id, &receipt, Utc::now(), self.cooldown_secs)
                    .await?;
                tx.commit().await?;
                Ok(OpRef {
                    record_id,
                    tx_ref,
                    outcome: OpOutcome::Confirmed(receipt),
                })
            }
            FinalityOutcome::Reverted(reason) => {
                tx.rollback().await?;
                Err(EngineError::Reverted {
                    tx_ref: tx_ref.to_string(),
                    reason,
                })
            }
            FinalityOutcome::Unknown => {
                // The transaction may still land; commit the Pending row so
                // the sweep can find it
                tx.commit().await?;
                self.metrics.pending_records.inc();
                warn!(
                    kind = kind_label,
                    tx_ref = %tx_ref,
                    record_id = %record_id,
                    "Chain outcome unknown, accepted pending"
                );
                Ok(OpRef {
                    record_id,
                    tx_ref,
                    outcome: OpOutcome::AcceptedPending,
                })
            }
        }
    }

    /// Resolve rows the sagas left `Pending`.
    pub async fn resolve_pending(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for record in self.store.pending_records().await? {
            match self.resolve_one(&record, now).await {
                Ok(Resolution::Confirmed) => report.confirmed += 1,
                Ok(Resolution::Failed) => report.failed += 1,
                Ok(Resolution::Expired) => report.expired += 1,
                Ok(Resolution::StillPending) => report.still_pending += 1,
                Err(e) => {
                    // Provider hiccup; the next sweep retries
                    warn!(record_id = %record.id, error = %e, "Sweep resolution failed");
                    report.still_pending += 1;
                }
            }
        }

        self.metrics
            .sweep_resolutions_total
            .with_label_values(&["confirmed"])
            .inc_by(report.confirmed as u64);
        self.metrics
            .sweep_resolutions_total
            .with_label_values(&["failed"])
            .inc_by((report.failed + report.expired) as u64);
        self.metrics.pending_records.set(report.still_pending as i64);

        if report != SweepReport::default() {
            info!(
                confirmed = report.confirmed,
                failed = report.failed,
                expired = report.expired,
                still_pending = report.still_pending,
                "Pending sweep finished"
            );
        }
        Ok(report)
    }

    async fn resolve_one(&self, record: &PendingRecord, now: DateTime<Utc>) -> Result<Resolution> {
        let past_grace = now - record.created_at > self.pending_grace;

        let tx_ref = match &record.tx_ref {
            Some(tx_ref) => TxRef::new(tx_ref.clone()),
            // No reference was ever recorded, so nothing can locate the
            // transaction; give it the grace period anyway
            None => {
                if past_grace {
                    let mut tx = self.store.begin().await?;
                    self.store.fail_record(&mut tx, record.kind, record.id).await?;
                    tx.commit().await?;
                    return Ok(Resolution::Expired);
                }
                return Ok(Resolution::StillPending);
            }
        };

        match self.provider.lookup(&tx_ref).await? {
            Some(TxStatus::Confirmed { receipt }) => {
                let mut tx = self.store.begin().await?;
                let applied = self
                    .store
                    .confirm_record(&mut tx, record.kind, record.id, &receipt, now, self.cooldown_secs)
                    .await?;
                tx.commit().await?;
                if applied {
                    info!(record_id = %record.id, tx_ref = %tx_ref, "Sweep confirmed pending record");
                }
                Ok(Resolution::Confirmed)
            }
            Some(TxStatus::Reverted { reason }) => {
                let mut tx = self.store.begin().await?;
                self.store.fail_record(&mut tx, record.kind, record.id).await?;
                tx.commit().await?;
                warn!(record_id = %record.id, tx_ref = %tx_ref, reason, "Sweep failed pending record");
                Ok(Resolution::Failed)
            }
            None if past_grace => {
                let mut tx = self.store.begin().await?;
                self.store.fail_record(&mut tx, record.kind, record.id).await?;
                tx.commit().await?;
                warn!(record_id = %record.id, tx_ref = %tx_ref, "Pending record expired unlocated");
                Ok(Resolution::Expired)
            }
            None => Ok(Resolution::StillPending),
        }
    }
}

enum Resolution {
    Confirmed,
    Failed,
    Expired,
    StillPending,
}
