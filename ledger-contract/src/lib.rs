//! GiveChain Ledger Contract
//!
//! Deterministic model of the on-chain state machine that is the single
//! source of monetary truth for the donation platform: charities,
//! campaigns, donations, fund-allocation events, per-charity balances and
//! withdrawal timelocks.
//!
//! # Invariants
//!
//! - Balances: Σ(confirmed donations) − Σ(confirmed withdrawals) ≥ 0
//! - Append-only: arena entries are never modified or deleted
//! - Campaign lifecycle is strictly forward: Created → Active → Ended
//! - Every mutation is an explicitly signed, sequenced operation

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod contract;
pub mod crypto;
pub mod error;
pub mod types;

// Re-exports
pub use contract::{authorize_withdrawal, ContractParams, LedgerContract};
pub use crypto::{address_of, AdminKeypair};
pub use error::{ContractError, Result};
pub use types::{
    Address, AllocationEvent, AllocationEventId, Asset, Campaign, CampaignId, CampaignStatus,
    ChainOperation, Charity, CharityId, Donation, DonationId, OpReceipt, Signature,
    SignedOperation,
};
