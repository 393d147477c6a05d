// Donation Engine Library
// Off-chain accounting core for the GiveChain donation platform

pub mod chain;
pub mod config;
pub mod core;
pub mod errors;
pub mod guard;
pub mod metrics;
pub mod mirror;
pub mod models;
pub mod reconcile;
pub mod sequencer;
pub mod sweeper;

// Re-exports
pub use chain::{ChainClient, ChainProvider, FinalityOutcome, InMemoryChain, TxRef, TxStatus};
pub use config::Config;
pub use crate::core::DonationCore;
pub use errors::{EngineError, Result};
pub use guard::Guard;
pub use metrics::EngineMetrics;
pub use mirror::{MirrorStore, StagedWrite};
pub use models::*;
pub use reconcile::{OpOutcome, OpRef, Reconciler, SweepReport};
pub use sequencer::{spawn_sequencer, SequencerHandle};
pub use sweeper::Sweeper;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SERVICE_NAME: &str = "donation-engine";
