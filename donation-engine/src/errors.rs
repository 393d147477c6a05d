use ledger_contract::ContractError;
use thiserror::Error;

/// Engine error taxonomy
///
/// Four caller-visible failure classes: rejected before submission,
/// reverted on chain, backpressure, and infrastructure faults. Unknown
/// outcomes are not errors; they surface as an accepted-pending result.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Rejected before any chain interaction (guard check or simulated
    /// revert); no mirror mutation occurred
    #[error("Rejected before submission: {0}")]
    Rejected(#[from] ContractError),

    /// Allocation claim exceeds the campaign's remaining confirmed funds
    #[error("Allocation of {requested} USD exceeds remaining funds {remaining} USD for campaign {campaign_id}")]
    AllocationExceedsRemaining {
        campaign_id: u64,
        requested: rust_decimal::Decimal,
        remaining: rust_decimal::Decimal,
    },

    /// The chain executed the operation and reverted it; the mirror
    /// transaction was rolled back
    #[error("Operation reverted on chain ({tx_ref}): {reason}")]
    Reverted { tx_ref: String, reason: String },

    /// Sequencer queue full; retryable overload, no partial state created
    #[error("Sequencer queue full, retry later")]
    Overloaded,

    /// The sequencer worker has halted (fatal credential condition)
    #[error("Sequencer halted")]
    SequencerHalted,

    /// Chain provider unreachable; retryable
    #[error("Chain provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Fee budget insufficient for submission; fatal for this request
    #[error("Fee budget exceeded: {0}")]
    FeeBudgetExceeded(String),

    /// The administrative credential is unusable (bad signature or
    /// sequence divergence); halts the sequencer
    #[error("Administrative credential unusable: {0}")]
    CredentialUnusable(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Fatal errors corrupt credential ordering if processing continues;
    /// the sequencer halts on them
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::CredentialUnusable(_))
    }

    /// Whether the caller may retry the identical request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Overloaded | EngineError::ProviderUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(EngineError::CredentialUnusable("seq diverged".into()).is_fatal());
        assert!(!EngineError::Overloaded.is_fatal());
        assert!(!EngineError::ProviderUnavailable("down".into()).is_fatal());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(EngineError::Overloaded.is_retryable());
        assert!(EngineError::ProviderUnavailable("down".into()).is_retryable());
        assert!(!EngineError::SequencerHalted.is_retryable());
        assert!(!EngineError::Reverted {
            tx_ref: "0x1".into(),
            reason: "dust".into()
        }
        .is_retryable());
    }
}
