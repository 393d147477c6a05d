//! Core types for the ledger contract
//!
//! All types are designed for:
//! - Deterministic serialization (bincode canonical bytes for signing)
//! - Exact arithmetic (Decimal for money)
//! - Append-only arenas (ids are monotonic indices, never reused)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Charity identifier (1-based arena index on chain)
pub type CharityId = u64;
/// Campaign identifier (1-based arena index on chain)
pub type CampaignId = u64;
/// Donation identifier (1-based arena index on chain)
pub type DonationId = u64;
/// Fund-allocation event identifier (1-based arena index on chain)
pub type AllocationEventId = u64;

/// On-chain identity (hex-encoded address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create new address
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The zero address is never a valid wallet
    pub fn is_zero(&self) -> bool {
        self.0.is_empty() || self.0 == "0x0" || self.0.trim_start_matches("0x").chars().all(|c| c == '0')
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asset held or donated: the chain's native unit or an accepted ERC20 token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    /// Native chain asset
    Native,
    /// ERC20 token, identified by its contract address
    Erc20(Address),
}

impl Asset {
    /// Stable string code for storage and logs
    pub fn code(&self) -> String {
        match self {
            Asset::Native => "native".to_string(),
            Asset::Erc20(token) => format!("erc20:{}", token),
        }
    }

    /// Parse from the stable string code
    pub fn from_code(code: &str) -> Option<Self> {
        if code == "native" {
            Some(Asset::Native)
        } else {
            code.strip_prefix("erc20:")
                .map(|addr| Asset::Erc20(Address::new(addr)))
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Campaign lifecycle status
///
/// Transitions are strictly forward: Created → Active → Ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    /// Created but not yet accepting donations
    Created,
    /// Accepting donations
    Active,
    /// No longer accepting donations; allocation events still permitted
    Ended,
}

impl CampaignStatus {
    /// Stable string code
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Created => "Created",
            CampaignStatus::Active => "Active",
            CampaignStatus::Ended => "Ended",
        }
    }

    /// Parse from the stable string code
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Created" => Some(CampaignStatus::Created),
            "Active" => Some(CampaignStatus::Active),
            "Ended" => Some(CampaignStatus::Ended),
            _ => None,
        }
    }

    /// Whether a transition to `next` moves forward in the lifecycle
    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        matches!(
            (self, next),
            (CampaignStatus::Created, CampaignStatus::Active)
                | (CampaignStatus::Created, CampaignStatus::Ended)
                | (CampaignStatus::Active, CampaignStatus::Ended)
        )
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registered charity
///
/// Immutable once created except the approval flag. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charity {
    /// Arena id
    pub id: CharityId,
    /// Owning wallet address (no uniqueness constraint: the administrative
    /// signer legitimately manages many charities)
    pub wallet: Address,
    /// Display name
    pub name: String,
    /// Off-chain metadata reference (IPFS or HTTP URI)
    pub metadata_ref: String,
    /// Approval flag (auto-approved on registration)
    pub approved: bool,
    /// Registration time (chain time)
    pub created_at: DateTime<Utc>,
}

/// Fundraising campaign, owned by exactly one charity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Arena id
    pub id: CampaignId,
    /// Owning charity
    pub charity_id: CharityId,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Goal amount (native units)
    pub goal_amount: Decimal,
    /// Start of the donation window
    pub start_at: DateTime<Utc>,
    /// End of the donation window; `None` means no end
    pub end_at: Option<DateTime<Utc>>,
    /// Lifecycle status
    pub status: CampaignStatus,
    /// Creation time (chain time)
    pub created_at: DateTime<Utc>,
}

/// Confirmed donation, immutable once recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    /// Arena id
    pub id: DonationId,
    /// Donor identity
    pub donor: Address,
    /// Receiving charity (transitively via campaign)
    pub charity_id: CharityId,
    /// Target campaign
    pub campaign_id: CampaignId,
    /// Donated asset
    pub asset: Asset,
    /// Donated quantity in asset units
    pub amount: Decimal,
    /// Externally-reported fiat equivalent (USD) at donation time
    pub fiat_amount_usd: Decimal,
    /// Donation time (chain time)
    pub at: DateTime<Utc>,
}

/// A charity manager's claim that funds were spent on a described activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationEvent {
    /// Arena id
    pub id: AllocationEventId,
    /// Campaign whose raised funds are being allocated
    pub campaign_id: CampaignId,
    /// Allocated amount in USD
    pub amount_usd: Decimal,
    /// Activity title (must be non-empty)
    pub title: String,
    /// Activity description
    pub description: String,
    /// Recording time (chain time)
    pub at: DateTime<Utc>,
}

/// Chain-mutating operation submitted under the administrative credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChainOperation {
    /// Register a charity (auto-approved)
    RegisterCharity {
        /// Owning wallet
        wallet: Address,
        /// Display name
        name: String,
        /// Metadata URI
        metadata_ref: String,
    },
    /// Create a campaign (creation implies activation)
    CreateCampaign {
        /// Owning charity
        charity_id: CharityId,
        /// Title
        title: String,
        /// Description
        description: String,
        /// Goal amount (native units)
        goal_amount: Decimal,
        /// Window start
        start_at: DateTime<Utc>,
        /// Window end; `None` = no end
        end_at: Option<DateTime<Utc>>,
    },
    /// Value-bearing native donation
    DonateNative {
        /// Target campaign
        campaign_id: CampaignId,
        /// Donor identity
        donor: Address,
        /// Transferred native value
        value: Decimal,
        /// Externally-reported USD equivalent
        fiat_amount_usd: Decimal,
    },
    /// ERC20 donation (token pulled from the caller)
    DonateErc20 {
        /// Target campaign
        campaign_id: CampaignId,
        /// Donor identity
        donor: Address,
        /// Token contract address
        token: Address,
        /// Token quantity
        amount: Decimal,
        /// Minimum acceptable quantity
        min_amount: Decimal,
        /// Externally-reported USD equivalent
        fiat_amount_usd: Decimal,
    },
    /// Record a fund-allocation claim
    CreateAllocationEvent {
        /// Campaign whose funds are allocated
        campaign_id: CampaignId,
        /// Amount in USD
        amount_usd: Decimal,
        /// Activity title
        title: String,
        /// Activity description
        description: String,
    },
    /// Withdraw from a charity balance
    Withdraw {
        /// Charity to debit
        charity_id: CharityId,
        /// Asset to withdraw
        asset: Asset,
        /// Quantity
        amount: Decimal,
        /// Authorization subject: charity wallet or administrative identity
        caller: Address,
    },
    /// End a campaign (donations rejected afterwards)
    EndCampaign {
        /// Campaign to end
        campaign_id: CampaignId,
    },
}

impl ChainOperation {
    /// Short operation name for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ChainOperation::RegisterCharity { .. } => "register_charity",
            ChainOperation::CreateCampaign { .. } => "create_campaign",
            ChainOperation::DonateNative { .. } => "donate_native",
            ChainOperation::DonateErc20 { .. } => "donate_erc20",
            ChainOperation::CreateAllocationEvent { .. } => "create_allocation_event",
            ChainOperation::Withdraw { .. } => "withdraw",
            ChainOperation::EndCampaign { .. } => "end_campaign",
        }
    }
}

/// Receipt emitted by a confirmed operation (mirrors contract event logs)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpReceipt {
    /// CharityRegistered event
    CharityRegistered {
        /// Assigned arena id
        charity_id: CharityId,
    },
    /// CampaignCreated event
    CampaignCreated {
        /// Assigned arena id
        campaign_id: CampaignId,
    },
    /// DonationRecorded event
    DonationRecorded {
        /// Assigned arena id
        donation_id: DonationId,
        /// Credited charity
        charity_id: CharityId,
    },
    /// AllocationRecorded event
    AllocationRecorded {
        /// Assigned arena id
        event_id: AllocationEventId,
    },
    /// WithdrawalExecuted event
    WithdrawalExecuted {
        /// Debited charity
        charity_id: CharityId,
        /// Remaining balance after the debit
        remaining: Decimal,
    },
    /// CampaignEnded event
    CampaignEnded {
        /// Ended campaign
        campaign_id: CampaignId,
    },
}

/// Ed25519 signature over an operation's canonical bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    /// Signature bytes (64 bytes)
    #[serde(with = "serde_bytes")]
    bytes: [u8; 64],
}

impl Signature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self { bytes }
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }

    /// Verify against a message and public key
    pub fn verify(&self, message: &[u8], public_key: &[u8; 32]) -> bool {
        use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};

        let signature = DalekSignature::from_bytes(&self.bytes);

        let verifying_key = match VerifyingKey::from_bytes(public_key) {
            Ok(key) => key,
            Err(_) => return false,
        };

        verifying_key.verify(message, &signature).is_ok()
    }
}

/// Operation envelope carrying the credential's sequence number
///
/// The sequence number is a global resource of the administrative
/// credential: the chain rejects any submission whose sequence is not the
/// exact successor of the last accepted one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedOperation {
    /// Credential sequence number (monotonic, never reused)
    pub sequence: u64,
    /// Submitting identity (always the administrative address)
    pub caller: Address,
    /// The operation itself
    pub operation: ChainOperation,
    /// Signature over the canonical bytes
    pub signature: Signature,
}

impl SignedOperation {
    /// Deterministic bytes covered by the signature
    pub fn canonical_bytes(sequence: u64, caller: &Address, operation: &ChainOperation) -> Vec<u8> {
        bincode::serialize(&(sequence, caller, operation)).expect("serialization cannot fail")
    }

    /// Verify the envelope signature with the submitter's public key
    pub fn verify(&self, public_key: &[u8; 32]) -> bool {
        let message = Self::canonical_bytes(self.sequence, &self.caller, &self.operation);
        self.signature.verify(&message, public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_address_zero() {
        assert!(Address::new("0x0").is_zero());
        assert!(Address::new("0x0000").is_zero());
        assert!(Address::new("").is_zero());
        assert!(!Address::new("0xabc123").is_zero());
    }

    #[test]
    fn test_asset_code_roundtrip() {
        assert_eq!(Asset::from_code("native"), Some(Asset::Native));
        let token = Asset::Erc20(Address::new("0xdeadbeef"));
        assert_eq!(Asset::from_code(&token.code()), Some(token));
        assert_eq!(Asset::from_code("bogus"), None);
    }

    #[test]
    fn test_campaign_status_forward_only() {
        assert!(CampaignStatus::Created.can_transition_to(CampaignStatus::Active));
        assert!(CampaignStatus::Active.can_transition_to(CampaignStatus::Ended));
        assert!(!CampaignStatus::Ended.can_transition_to(CampaignStatus::Active));
        assert!(!CampaignStatus::Active.can_transition_to(CampaignStatus::Created));
        assert!(!CampaignStatus::Ended.can_transition_to(CampaignStatus::Created));
    }

    #[test]
    fn test_canonical_bytes_deterministic() {
        let op = ChainOperation::DonateNative {
            campaign_id: 1,
            donor: Address::new("0xdonor"),
            value: dec!(0.01),
            fiat_amount_usd: dec!(50),
        };
        let caller = Address::new("0xadmin");
        let a = SignedOperation::canonical_bytes(7, &caller, &op);
        let b = SignedOperation::canonical_bytes(7, &caller, &op);
        assert_eq!(a, b);

        // Different sequence must produce different bytes
        let c = SignedOperation::canonical_bytes(8, &caller, &op);
        assert_ne!(a, c);
    }

    #[test]
    fn test_operation_kind() {
        let op = ChainOperation::EndCampaign { campaign_id: 3 };
        assert_eq!(op.kind(), "end_campaign");
    }
}
