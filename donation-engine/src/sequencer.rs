//! Single-writer sequencer for chain submissions
//!
//! The administrative credential carries one sequence counter, so all
//! submissions funnel through a single worker task that owns the
//! [`ChainClient`]. Callers enqueue through a bounded mailbox; a full
//! mailbox rejects immediately rather than queueing unbounded work.
//!
//! Each request gets two replies: the submission result (a transaction
//! reference, or the error that kept the operation off the chain) and,
//! once the reference exists, the finality outcome. The caller holds its
//! mirror transaction open between the two.

use ledger_contract::ChainOperation;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::chain::{ChainClient, ChainProvider, FinalityOutcome, TxRef};
use crate::errors::{EngineError, Result};
use crate::metrics::EngineMetrics;
use std::sync::Arc;

/// One queued submission
pub struct ChainRequest {
    pub operation: ChainOperation,
    /// Resolved as soon as submission succeeds or fails
    pub submitted_tx: oneshot::Sender<Result<TxRef>>,
    /// Resolved after the finality wait; never sent if submission failed
    pub outcome_tx: oneshot::Sender<FinalityOutcome>,
}

/// Caller-side channels for one in-flight submission
pub struct PendingSubmission {
    pub submitted: oneshot::Receiver<Result<TxRef>>,
    pub outcome: oneshot::Receiver<FinalityOutcome>,
}

/// Cloneable handle to the sequencer mailbox
#[derive(Clone)]
pub struct SequencerHandle {
    tx: mpsc::Sender<ChainRequest>,
    metrics: Arc<EngineMetrics>,
}

impl SequencerHandle {
    /// Enqueue an operation without blocking.
    ///
    /// Returns [`EngineError::Overloaded`] when the mailbox is full and
    /// [`EngineError::SequencerHalted`] when the worker has stopped.
    pub fn enqueue(&self, operation: ChainOperation) -> Result<PendingSubmission> {
        let (submitted_tx, submitted_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let request = ChainRequest {
            operation,
            submitted_tx,
            outcome_tx,
        };
        match self.tx.try_send(request) {
            Ok(()) => {
                self.metrics.sequencer_depth.inc();
                Ok(PendingSubmission {
                    submitted: submitted_rx,
                    outcome: outcome_rx,
                })
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.overloaded_total.inc();
                Err(EngineError::Overloaded)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EngineError::SequencerHalted),
        }
    }
}

/// Spawn the worker task; returns the handle callers submit through
pub fn spawn_sequencer<P: ChainProvider + 'static>(
    client: ChainClient<P>,
    capacity: usize,
    metrics: Arc<EngineMetrics>,
) -> (SequencerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity);
    let worker = tokio::spawn(run_worker(client, rx, metrics.clone()));
    (SequencerHandle { tx, metrics }, worker)
}

async fn run_worker<P: ChainProvider>(
    mut client: ChainClient<P>,
    mut rx: mpsc::Receiver<ChainRequest>,
    metrics: Arc<EngineMetrics>,
) {
    info!(provider = client.provider().name(), "Sequencer worker started");

    while let Some(request) = rx.recv().await {
        let kind = request.operation.kind();
        metrics.sequencer_depth.dec();

        let timer = metrics.submission_duration.start_timer();
        match client.submit(request.operation).await {
            Ok(tx_ref) => {
                metrics.submissions_total.with_label_values(&[kind]).inc();
                // Caller may have given up; the chain outcome still stands
                let _ = request.submitted_tx.send(Ok(tx_ref.clone()));

                let outcome = client.wait_finality(&tx_ref).await;
                timer.observe_duration();
                match &outcome {
                    FinalityOutcome::Confirmed(_) => {
                        metrics.confirmed_total.with_label_values(&[kind]).inc()
                    }
                    FinalityOutcome::Reverted(_) => {
                        metrics.reverted_total.with_label_values(&[kind]).inc()
                    }
                    FinalityOutcome::Unknown => metrics.unknown_total.inc(),
                }
                let _ = request.outcome_tx.send(outcome);
            }
            Err(e) => {
                timer.observe_duration();
                let fatal = e.is_fatal();
                if fatal {
                    error!(kind, error = %e, "Fatal submission error, halting sequencer");
                } else {
                    warn!(kind, error = %e, "Submission failed");
                }
                let _ = request.submitted_tx.send(Err(e));
                if fatal {
                    // Dropping the mailbox fails all queued and future
                    // enqueues with SequencerHalted
                    break;
                }
            }
        }
    }

    info!("Sequencer worker stopped");
}
