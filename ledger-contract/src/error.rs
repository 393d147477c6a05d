//! Error types for the ledger contract

use crate::types::{Address, CampaignId, CampaignStatus, CharityId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for contract operations
pub type Result<T> = std::result::Result<T, ContractError>;

/// Reverts raised by the contract state machine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    /// Wallet address is the zero address
    #[error("Zero wallet address is not a valid charity wallet")]
    ZeroWallet,

    /// Charity id not present in the arena
    #[error("Charity not found: {0}")]
    CharityNotFound(CharityId),

    /// Charity exists but is not approved
    #[error("Charity not approved: {0}")]
    CharityNotApproved(CharityId),

    /// Campaign id not present in the arena
    #[error("Campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    /// Campaign is not accepting the requested operation
    #[error("Campaign {campaign_id} is not active (status: {status})")]
    CampaignNotActive {
        /// Target campaign
        campaign_id: CampaignId,
        /// Its current status
        status: CampaignStatus,
    },

    /// endAt must be after startAt when set
    #[error("Campaign schedule invalid: end {end_at} is not after start {start_at}")]
    InvalidSchedule {
        /// Requested start
        start_at: chrono::DateTime<chrono::Utc>,
        /// Requested end
        end_at: chrono::DateTime<chrono::Utc>,
    },

    /// Native value below the dust threshold
    #[error("Donation value {value} below dust threshold {minimum}")]
    BelowDustThreshold {
        /// Transferred value
        value: Decimal,
        /// Contract minimum
        minimum: Decimal,
    },

    /// Token is not on the accepted-asset allow-list
    #[error("Token not accepted: {0}")]
    TokenNotAccepted(Address),

    /// ERC20 amount below the caller-provided minimum
    #[error("Token amount {amount} below minimum {min_amount}")]
    BelowMinAmount {
        /// Offered quantity
        amount: Decimal,
        /// Required minimum
        min_amount: Decimal,
    },

    /// Reported fiat equivalent must be positive
    #[error("Reported fiat amount must be positive, got {0}")]
    InvalidFiatAmount(Decimal),

    /// Monetary amount must be positive
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    /// Allocation event title must be non-empty
    #[error("Allocation event title must not be empty")]
    EmptyTitle,

    /// Caller is neither the charity wallet nor the administrative identity
    #[error("Caller {caller} not authorized to withdraw for charity {charity_id}")]
    Unauthorized {
        /// Target charity
        charity_id: CharityId,
        /// Rejected caller
        caller: Address,
    },

    /// Withdrawal requested before the timelock expired
    #[error("Withdrawal for charity {charity_id} locked until {until}")]
    WithdrawalLocked {
        /// Target charity
        charity_id: CharityId,
        /// Lock expiry
        until: chrono::DateTime<chrono::Utc>,
    },

    /// Withdrawal exceeds the charity's balance
    #[error(
        "Insufficient balance for charity {charity_id}: requested {requested}, available {available}"
    )]
    InsufficientBalance {
        /// Target charity
        charity_id: CharityId,
        /// Requested amount
        requested: Decimal,
        /// Confirmed balance
        available: Decimal,
    },

    /// Status transition would move backwards in the lifecycle
    #[error("Invalid campaign status transition: {from} -> {to}")]
    InvalidStatusTransition {
        /// Current status
        from: CampaignStatus,
        /// Requested status
        to: CampaignStatus,
    },

    /// Envelope signature did not verify or the caller is unknown
    #[error("Signature verification failed for caller {0}")]
    BadSignature(Address),

    /// Sequence number is not the credential's next expected value
    #[error("Bad sequence number: expected {expected}, got {got}")]
    BadSequence {
        /// Next expected sequence
        expected: u64,
        /// Submitted sequence
        got: u64,
    },
}
