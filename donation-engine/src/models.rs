//! Mirror record types
//!
//! Every chain-mutating operation stages one row here before submission.
//! Rows move `Pending -> Confirmed` or `Pending -> Failed`; a row left
//! `Pending` means the chain outcome was unknown when the request
//! finished, and the sweep resolves it later.

use chrono::{DateTime, Utc};
use ledger_contract::CampaignStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Saga status of a mirror row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Pending,
    Confirmed,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "Pending",
            RecordStatus::Confirmed => "Confirmed",
            RecordStatus::Failed => "Failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(RecordStatus::Pending),
            "Confirmed" => Some(RecordStatus::Confirmed),
            "Failed" => Some(RecordStatus::Failed),
            _ => None,
        }
    }
}

/// Which mirror table a record lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Charity,
    Campaign,
    Donation,
    Allocation,
    Withdrawal,
    CampaignEnd,
}

impl RecordKind {
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Charity => "charities",
            RecordKind::Campaign => "campaigns",
            RecordKind::Donation => "donations",
            RecordKind::Allocation => "allocation_events",
            RecordKind::Withdrawal => "withdrawals",
            RecordKind::CampaignEnd => "campaign_status_changes",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Charity => "charity",
            RecordKind::Campaign => "campaign",
            RecordKind::Donation => "donation",
            RecordKind::Allocation => "allocation",
            RecordKind::Withdrawal => "withdrawal",
            RecordKind::CampaignEnd => "campaign_end",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "charity" => Some(RecordKind::Charity),
            "campaign" => Some(RecordKind::Campaign),
            "donation" => Some(RecordKind::Donation),
            "allocation" => Some(RecordKind::Allocation),
            "withdrawal" => Some(RecordKind::Withdrawal),
            "campaign_end" => Some(RecordKind::CampaignEnd),
            _ => None,
        }
    }

    pub fn all() -> [RecordKind; 6] {
        [
            RecordKind::Charity,
            RecordKind::Campaign,
            RecordKind::Donation,
            RecordKind::Allocation,
            RecordKind::Withdrawal,
            RecordKind::CampaignEnd,
        ]
    }
}

/// Charity mirror row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharityRecord {
    pub id: Uuid,
    /// Contract-assigned id, filled on confirmation
    pub chain_id: Option<u64>,
    pub wallet: String,
    pub name: String,
    pub metadata_ref: String,
    /// Sum of confirmed donation fiat amounts across all campaigns
    pub total_raised_usd: Decimal,
    /// Earliest time a withdrawal may execute, per the mirror's view
    pub lock_until: Option<DateTime<Utc>>,
    pub status: RecordStatus,
    pub tx_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Campaign mirror row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: Uuid,
    pub chain_id: Option<u64>,
    /// Owning charity's contract id
    pub charity_chain_id: u64,
    pub title: String,
    pub description: String,
    pub goal_amount: Decimal,
    /// Sum of confirmed donation fiat amounts
    pub raised_usd: Decimal,
    /// Sum of confirmed allocation amounts
    pub allocated_usd: Decimal,
    pub campaign_status: CampaignStatus,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub status: RecordStatus,
    pub tx_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Donation mirror row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationRecord {
    pub id: Uuid,
    pub chain_id: Option<u64>,
    pub campaign_chain_id: u64,
    pub donor: String,
    /// `native` or `erc20:<address>`
    pub asset_code: String,
    pub amount: Decimal,
    pub fiat_amount_usd: Decimal,
    pub status: RecordStatus,
    pub tx_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Allocation-event mirror row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub id: Uuid,
    pub chain_id: Option<u64>,
    pub campaign_chain_id: u64,
    pub amount_usd: Decimal,
    pub title: String,
    pub description: String,
    pub status: RecordStatus,
    pub tx_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Withdrawal mirror row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub id: Uuid,
    pub charity_chain_id: u64,
    pub asset_code: String,
    pub amount: Decimal,
    pub caller: String,
    pub status: RecordStatus,
    pub tx_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Campaign status-change mirror row (end operations)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStatusChangeRecord {
    pub id: Uuid,
    pub campaign_chain_id: u64,
    pub new_status: CampaignStatus,
    pub status: RecordStatus,
    pub tx_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fund utilization summary for one campaign, confirmed rows only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignUtilization {
    pub campaign_chain_id: u64,
    pub raised_usd: Decimal,
    pub allocated_usd: Decimal,
    pub remaining_usd: Decimal,
    /// allocated / raised, as a percentage; zero when nothing was raised
    pub utilization_pct: Decimal,
    pub events_count: u64,
    pub donor_count: u64,
}

/// A row still awaiting chain resolution
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub kind: RecordKind,
    pub id: Uuid,
    pub tx_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_status_round_trip() {
        for status in [
            RecordStatus::Pending,
            RecordStatus::Confirmed,
            RecordStatus::Failed,
        ] {
            assert_eq!(RecordStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(RecordStatus::from_str("pending"), None);
    }

    #[test]
    fn test_record_kind_tables_are_distinct() {
        let tables: std::collections::HashSet<_> =
            RecordKind::all().iter().map(|k| k.table()).collect();
        assert_eq!(tables.len(), 6);
    }
}
