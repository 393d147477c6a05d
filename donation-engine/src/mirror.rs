//! SQLite mirror of chain state
//!
//! The mirror is a read model, never an authority: every row corresponding
//! to a chain operation starts `Pending` inside a transaction that stays
//! open across submission, and only a chain confirmation moves it to
//! `Confirmed`. All user-facing reads consider confirmed rows only.
//!
//! Decimal amounts are stored as TEXT and summed in Rust; SQLite's
//! numeric affinity would round them through floats.

use chrono::{DateTime, Duration, Utc};
use ledger_contract::{CampaignStatus, OpReceipt};
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::errors::{EngineError, Result};
use crate::models::{
    AllocationRecord, CampaignRecord, CampaignStatusChangeRecord, CampaignUtilization,
    CharityRecord, DonationRecord, PendingRecord, RecordKind, RecordStatus, WithdrawalRecord,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS charities (
        id TEXT PRIMARY KEY,
        chain_id INTEGER,
        wallet TEXT NOT NULL,
        name TEXT NOT NULL,
        metadata_ref TEXT NOT NULL,
        total_raised_usd TEXT NOT NULL DEFAULT '0',
        lock_until TEXT,
        status TEXT NOT NULL,
        tx_ref TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS campaigns (
        id TEXT PRIMARY KEY,
        chain_id INTEGER,
        charity_chain_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        goal_amount TEXT NOT NULL,
        raised_usd TEXT NOT NULL DEFAULT '0',
        allocated_usd TEXT NOT NULL DEFAULT '0',
        campaign_status TEXT NOT NULL,
        start_at TEXT NOT NULL,
        end_at TEXT,
        status TEXT NOT NULL,
        tx_ref TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS donations (
        id TEXT PRIMARY KEY,
        chain_id INTEGER,
        campaign_chain_id INTEGER NOT NULL,
        donor TEXT NOT NULL,
        asset_code TEXT NOT NULL,
        amount TEXT NOT NULL,
        fiat_amount_usd TEXT NOT NULL,
        status TEXT NOT NULL,
        tx_ref TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS allocation_events (
        id TEXT PRIMARY KEY,
        chain_id INTEGER,
        campaign_chain_id INTEGER NOT NULL,
        amount_usd TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        status TEXT NOT NULL,
        tx_ref TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS withdrawals (
        id TEXT PRIMARY KEY,
        charity_chain_id INTEGER NOT NULL,
        asset_code TEXT NOT NULL,
        amount TEXT NOT NULL,
        caller TEXT NOT NULL,
        status TEXT NOT NULL,
        tx_ref TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS campaign_status_changes (
        id TEXT PRIMARY KEY,
        campaign_chain_id INTEGER NOT NULL,
        new_status TEXT NOT NULL,
        status TEXT NOT NULL,
        tx_ref TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_charities_chain_id ON charities (chain_id)",
    "CREATE INDEX IF NOT EXISTS idx_campaigns_chain_id ON campaigns (chain_id)",
    "CREATE INDEX IF NOT EXISTS idx_donations_campaign ON donations (campaign_chain_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_allocations_campaign ON allocation_events (campaign_chain_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_withdrawals_charity ON withdrawals (charity_chain_id, status)",
];

/// A write about to be staged `Pending` ahead of chain submission
#[derive(Debug, Clone)]
pub enum StagedWrite {
    Charity {
        wallet: String,
        name: String,
        metadata_ref: String,
    },
    Campaign {
        charity_chain_id: u64,
        title: String,
        description: String,
        goal_amount: Decimal,
        start_at: DateTime<Utc>,
        end_at: Option<DateTime<Utc>>,
    },
    Donation {
        campaign_chain_id: u64,
        donor: String,
        asset_code: String,
        amount: Decimal,
        fiat_amount_usd: Decimal,
    },
    Allocation {
        campaign_chain_id: u64,
        amount_usd: Decimal,
        title: String,
        description: String,
    },
    Withdrawal {
        charity_chain_id: u64,
        asset_code: String,
        amount: Decimal,
        caller: String,
    },
    CampaignEnd { campaign_chain_id: u64 },
}

impl StagedWrite {
    pub fn kind(&self) -> RecordKind {
        match self {
            StagedWrite::Charity { .. } => RecordKind::Charity,
            StagedWrite::Campaign { .. } => RecordKind::Campaign,
            StagedWrite::Donation { .. } => RecordKind::Donation,
            StagedWrite::Allocation { .. } => RecordKind::Allocation,
            StagedWrite::Withdrawal { .. } => RecordKind::Withdrawal,
            StagedWrite::CampaignEnd { .. } => RecordKind::CampaignEnd,
        }
    }
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s)
        .map_err(|e| EngineError::Internal(format!("stored decimal unparsable: {}", e)))
}

fn chain_id_from(row_value: Option<i64>) -> Option<u64> {
    row_value.map(|v| v as u64)
}

#[derive(Clone)]
pub struct MirrorStore {
    pool: SqlitePool,
}

impl MirrorStore {
    /// Connect and apply the schema
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.apply_schema().await?;
        info!(url, "Mirror database ready");
        Ok(store)
    }

    /// In-memory database for tests; a single connection keeps every
    /// session on the same store
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.apply_schema().await?;
        Ok(store)
    }

    async fn apply_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Insert a `Pending` row for the write inside the caller's transaction
    pub async fn stage(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        write: &StagedWrite,
    ) -> Result<(RecordKind, Uuid)> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let pending = RecordStatus::Pending.as_str();

        match write {
            StagedWrite::Charity {
                wallet,
                name,
                metadata_ref,
            } => {
                sqlx::query(
                    "INSERT INTO charities
                        (id, wallet, name, metadata_ref, total_raised_usd, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, '0', ?5, ?6, ?6)",
                )
                .bind(id.to_string())
                .bind(wallet)
                .bind(name)
                .bind(metadata_ref)
                .bind(pending)
                .bind(now)
                .execute(&mut **tx)
                .await?;
            }
            StagedWrite::Campaign {
                charity_chain_id,
                title,
                description,
                goal_amount,
                start_at,
                end_at,
            } => {
                sqlx::query(
                    "INSERT INTO campaigns
                        (id, charity_chain_id, title, description, goal_amount,
                         raised_usd, allocated_usd, campaign_status, start_at, end_at,
                         status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, '0', '0', ?6, ?7, ?8, ?9, ?10, ?10)",
                )
                .bind(id.to_string())
                .bind(*charity_chain_id as i64)
                .bind(title)
                .bind(description)
                .bind(goal_amount.to_string())
                // Creation implies activation on chain
                .bind(CampaignStatus::Active.as_str())
                .bind(start_at)
                .bind(end_at)
                .bind(pending)
                .bind(now)
                .execute(&mut **tx)
                .await?;
            }
            StagedWrite::Donation {
                campaign_chain_id,
                donor,
                asset_code,
                amount,
                fiat_amount_usd,
            } => {
                sqlx::query(
                    "INSERT INTO donations
                        (id, campaign_chain_id, donor, asset_code, amount, fiat_amount_usd,
                         status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .bind(id.to_string())
                .bind(*campaign_chain_id as i64)
                .bind(donor)
                .bind(asset_code)
                .bind(amount.to_string())
                .bind(fiat_amount_usd.to_string())
                .bind(pending)
                .bind(now)
                .execute(&mut **tx)
                .await?;
            }
            StagedWrite::Allocation {
                campaign_chain_id,
                amount_usd,
                title,
                description,
            } => {
                sqlx::query(
                    "INSERT INTO allocation_events
                        (id, campaign_chain_id, amount_usd, title, description, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .bind(id.to_string())
                .bind(*campaign_chain_id as i64)
                .bind(amount_usd.to_string())
                .bind(title)
                .bind(description)
                .bind(pending)
                .bind(now)
                .execute(&mut **tx)
                .await?;
            }
            StagedWrite::Withdrawal {
                charity_chain_id,
                asset_code,
                amount,
                caller,
            } => {
                sqlx::query(
                    "INSERT INTO withdrawals
                        (id, charity_chain_id, asset_code, amount, caller, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .bind(id.to_string())
                .bind(*charity_chain_id as i64)
                .bind(asset_code)
                .bind(amount.to_string())
                .bind(caller)
                .bind(pending)
                .bind(now)
                .execute(&mut **tx)
                .await?;
            }
            StagedWrite::CampaignEnd { campaign_chain_id } => {
                sqlx::query(
                    "INSERT INTO campaign_status_changes
                        (id, campaign_chain_id, new_status, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .bind(id.to_string())
                .bind(*campaign_chain_id as i64)
                .bind(CampaignStatus::Ended.as_str())
                .bind(pending)
                .bind(now)
                .execute(&mut **tx)
                .await?;
            }
        }

        Ok((write.kind(), id))
    }

    /// Record the transaction reference on a pending row, so the sweep can
    /// locate the transaction if the outcome never arrives
    pub async fn set_tx_ref(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        kind: RecordKind,
        id: Uuid,
        tx_ref: &str,
    ) -> Result<()> {
        let sql = format!("UPDATE {} SET tx_ref = ?1 WHERE id = ?2", kind.table());
        sqlx::query(&sql)
            .bind(tx_ref)
            .bind(id.to_string())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Move a pending row to `Confirmed`, fill its chain id from the
    /// receipt, and refresh derived aggregates.
    ///
    /// Guarded by `status = 'Pending'`: returns `false` without touching
    /// anything when the row was already resolved, which makes the saga
    /// commit and the sweep safe to race.
    pub async fn confirm_record(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        kind: RecordKind,
        id: Uuid,
        receipt: &OpReceipt,
        now: DateTime<Utc>,
        cooldown_secs: i64,
    ) -> Result<bool> {
        let confirmed = RecordStatus::Confirmed.as_str();
        let pending = RecordStatus::Pending.as_str();

        match (kind, receipt) {
            (RecordKind::Charity, OpReceipt::CharityRegistered { charity_id }) => {
                let updated = sqlx::query(
                    "UPDATE charities SET status = ?1, chain_id = ?2, updated_at = ?3
                     WHERE id = ?4 AND status = ?5",
                )
                .bind(confirmed)
                .bind(*charity_id as i64)
                .bind(now)
                .bind(id.to_string())
                .bind(pending)
                .execute(&mut **tx)
                .await?
                .rows_affected();
                Ok(updated > 0)
            }
            (RecordKind::Campaign, OpReceipt::CampaignCreated { campaign_id }) => {
                let updated = sqlx::query(
                    "UPDATE campaigns SET status = ?1, chain_id = ?2, updated_at = ?3
                     WHERE id = ?4 AND status = ?5",
                )
                .bind(confirmed)
                .bind(*campaign_id as i64)
                .bind(now)
                .bind(id.to_string())
                .bind(pending)
                .execute(&mut **tx)
                .await?
                .rows_affected();
                Ok(updated > 0)
            }
            (
                RecordKind::Donation,
                OpReceipt::DonationRecorded {
                    donation_id,
                    charity_id,
                },
            ) => {
                let updated = sqlx::query(
                    "UPDATE donations SET status = ?1, chain_id = ?2 WHERE id = ?3 AND status = ?4",
                )
                .bind(confirmed)
                .bind(*donation_id as i64)
                .bind(id.to_string())
                .bind(pending)
                .execute(&mut **tx)
                .await?
                .rows_affected();
                if updated == 0 {
                    return Ok(false);
                }

                let campaign_chain_id: i64 =
                    sqlx::query("SELECT campaign_chain_id FROM donations WHERE id = ?1")
                        .bind(id.to_string())
                        .fetch_one(&mut **tx)
                        .await?
                        .try_get("campaign_chain_id")?;

                self.refresh_campaign_raised(tx, campaign_chain_id, now).await?;
                self.refresh_charity_totals(tx, *charity_id as i64, now, Some(cooldown_secs))
                    .await?;
                Ok(true)
            }
            (RecordKind::Allocation, OpReceipt::AllocationRecorded { event_id }) => {
                let updated = sqlx::query(
                    "UPDATE allocation_events SET status = ?1, chain_id = ?2
                     WHERE id = ?3 AND status = ?4",
                )
                .bind(confirmed)
                .bind(*event_id as i64)
                .bind(id.to_string())
                .bind(pending)
                .execute(&mut **tx)
                .await?
                .rows_affected();
                if updated == 0 {
                    return Ok(false);
                }

                let campaign_chain_id: i64 =
                    sqlx::query("SELECT campaign_chain_id FROM allocation_events WHERE id = ?1")
                        .bind(id.to_string())
                        .fetch_one(&mut **tx)
                        .await?
                        .try_get("campaign_chain_id")?;
                self.refresh_campaign_allocated(tx, campaign_chain_id, now).await?;
                Ok(true)
            }
            (RecordKind::Withdrawal, OpReceipt::WithdrawalExecuted { .. }) => {
                let updated = sqlx::query(
                    "UPDATE withdrawals SET status = ?1 WHERE id = ?2 AND status = ?3",
                )
                .bind(confirmed)
                .bind(id.to_string())
                .bind(pending)
                .execute(&mut **tx)
                .await?
                .rows_affected();
                Ok(updated > 0)
            }
            (RecordKind::CampaignEnd, OpReceipt::CampaignEnded { campaign_id }) => {
                let updated = sqlx::query(
                    "UPDATE campaign_status_changes SET status = ?1 WHERE id = ?2 AND status = ?3",
                )
                .bind(confirmed)
                .bind(id.to_string())
                .bind(pending)
                .execute(&mut **tx)
                .await?
                .rows_affected();
                if updated == 0 {
                    return Ok(false);
                }
                sqlx::query(
                    "UPDATE campaigns SET campaign_status = ?1, updated_at = ?2 WHERE chain_id = ?3",
                )
                .bind(CampaignStatus::Ended.as_str())
                .bind(now)
                .bind(*campaign_id as i64)
                .execute(&mut **tx)
                .await?;
                Ok(true)
            }
            (kind, receipt) => Err(EngineError::Internal(format!(
                "receipt {:?} does not match record kind {}",
                receipt,
                kind.as_str()
            ))),
        }
    }

    /// Move a pending row to `Failed`; same idempotence guard as confirm
    pub async fn fail_record(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        kind: RecordKind,
        id: Uuid,
    ) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET status = ?1 WHERE id = ?2 AND status = ?3",
            kind.table()
        );
        let updated = sqlx::query(&sql)
            .bind(RecordStatus::Failed.as_str())
            .bind(id.to_string())
            .bind(RecordStatus::Pending.as_str())
            .execute(&mut **tx)
            .await?
            .rows_affected();
        Ok(updated > 0)
    }

    async fn refresh_campaign_raised(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        campaign_chain_id: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let raised = self
            .sum_column(
                tx,
                "SELECT fiat_amount_usd FROM donations
                 WHERE campaign_chain_id = ?1 AND status = 'Confirmed'",
                campaign_chain_id,
            )
            .await?;
        sqlx::query("UPDATE campaigns SET raised_usd = ?1, updated_at = ?2 WHERE chain_id = ?3")
            .bind(raised.to_string())
            .bind(now)
            .bind(campaign_chain_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn refresh_campaign_allocated(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        campaign_chain_id: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let allocated = self
            .sum_column(
                tx,
                "SELECT amount_usd FROM allocation_events
                 WHERE campaign_chain_id = ?1 AND status = 'Confirmed'",
                campaign_chain_id,
            )
            .await?;
        sqlx::query("UPDATE campaigns SET allocated_usd = ?1, updated_at = ?2 WHERE chain_id = ?3")
            .bind(allocated.to_string())
            .bind(now)
            .bind(campaign_chain_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn refresh_charity_totals(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        charity_chain_id: i64,
        now: DateTime<Utc>,
        rearm_cooldown_secs: Option<i64>,
    ) -> Result<()> {
        let rows = sqlx::query(
            "SELECT d.fiat_amount_usd AS v FROM donations d
             JOIN campaigns c ON c.chain_id = d.campaign_chain_id
             WHERE c.charity_chain_id = ?1 AND d.status = 'Confirmed'",
        )
        .bind(charity_chain_id)
        .fetch_all(&mut **tx)
        .await?;
        let mut total = Decimal::ZERO;
        for row in rows {
            total += parse_decimal(&row.try_get::<String, _>("v")?)?;
        }

        // A confirmed donation re-arms the withdrawal lock
        let lock_until = rearm_cooldown_secs.map(|secs| now + Duration::seconds(secs));
        sqlx::query(
            "UPDATE charities SET total_raised_usd = ?1,
                lock_until = COALESCE(?2, lock_until), updated_at = ?3
             WHERE chain_id = ?4",
        )
        .bind(total.to_string())
        .bind(lock_until)
        .bind(now)
        .bind(charity_chain_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn sum_column(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        sql: &str,
        bind: i64,
    ) -> Result<Decimal> {
        let rows = sqlx::query(sql).bind(bind).fetch_all(&mut **tx).await?;
        let mut total = Decimal::ZERO;
        for row in rows {
            total += parse_decimal(&row.try_get::<String, _>(0)?)?;
        }
        Ok(total)
    }

    // ── Confirmed-only reads ────────────────────────────────────────

    pub async fn charity_by_chain_id(&self, chain_id: u64) -> Result<Option<CharityRecord>> {
        let row = sqlx::query(
            "SELECT * FROM charities WHERE chain_id = ?1 AND status = 'Confirmed'",
        )
        .bind(chain_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.map(charity_from_row).transpose()
    }

    pub async fn campaign_by_chain_id(&self, chain_id: u64) -> Result<Option<CampaignRecord>> {
        let row = sqlx::query(
            "SELECT * FROM campaigns WHERE chain_id = ?1 AND status = 'Confirmed'",
        )
        .bind(chain_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.map(campaign_from_row).transpose()
    }

    /// Fund utilization for one confirmed campaign
    pub async fn utilization(&self, campaign_chain_id: u64) -> Result<Option<CampaignUtilization>> {
        let campaign = match self.campaign_by_chain_id(campaign_chain_id).await? {
            Some(c) => c,
            None => return Ok(None),
        };
        let donor_count: i64 = sqlx::query(
            "SELECT COUNT(DISTINCT donor) AS n FROM donations
             WHERE campaign_chain_id = ?1 AND status = 'Confirmed'",
        )
        .bind(campaign_chain_id as i64)
        .fetch_one(&self.pool)
        .await?
        .try_get("n")?;
        let events_count: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM allocation_events
             WHERE campaign_chain_id = ?1 AND status = 'Confirmed'",
        )
        .bind(campaign_chain_id as i64)
        .fetch_one(&self.pool)
        .await?
        .try_get("n")?;

        let utilization_pct = if campaign.raised_usd > Decimal::ZERO {
            campaign.allocated_usd / campaign.raised_usd * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };

        Ok(Some(CampaignUtilization {
            campaign_chain_id,
            raised_usd: campaign.raised_usd,
            allocated_usd: campaign.allocated_usd,
            remaining_usd: campaign.raised_usd - campaign.allocated_usd,
            utilization_pct,
            events_count: events_count as u64,
            donor_count: donor_count as u64,
        }))
    }

    /// Total allocation claims already committed against a campaign,
    /// counting `Pending` rows as well as `Confirmed` ones. Pending
    /// claims may still confirm through the sweep, so they reserve their
    /// funds until resolved.
    pub async fn reserved_allocation_total(&self, campaign_chain_id: u64) -> Result<Decimal> {
        let rows = sqlx::query(
            "SELECT amount_usd AS v FROM allocation_events
             WHERE campaign_chain_id = ?1 AND status IN ('Pending', 'Confirmed')",
        )
        .bind(campaign_chain_id as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut total = Decimal::ZERO;
        for row in rows {
            total += parse_decimal(&row.try_get::<String, _>("v")?)?;
        }
        Ok(total)
    }

    /// Confirmed balance of one charity in one asset: confirmed donations
    /// in, confirmed withdrawals out
    pub async fn confirmed_balance(
        &self,
        charity_chain_id: u64,
        asset_code: &str,
    ) -> Result<Decimal> {
        let donated_rows = sqlx::query(
            "SELECT d.amount AS v FROM donations d
             JOIN campaigns c ON c.chain_id = d.campaign_chain_id
             WHERE c.charity_chain_id = ?1 AND d.asset_code = ?2 AND d.status = 'Confirmed'",
        )
        .bind(charity_chain_id as i64)
        .bind(asset_code)
        .fetch_all(&self.pool)
        .await?;
        let withdrawn_rows = sqlx::query(
            "SELECT amount AS v FROM withdrawals
             WHERE charity_chain_id = ?1 AND asset_code = ?2 AND status = 'Confirmed'",
        )
        .bind(charity_chain_id as i64)
        .bind(asset_code)
        .fetch_all(&self.pool)
        .await?;

        let mut balance = Decimal::ZERO;
        for row in donated_rows {
            balance += parse_decimal(&row.try_get::<String, _>("v")?)?;
        }
        for row in withdrawn_rows {
            balance -= parse_decimal(&row.try_get::<String, _>("v")?)?;
        }
        Ok(balance)
    }

    /// Mirror's view of the charity's withdrawal lock
    pub async fn lock_until(&self, charity_chain_id: u64) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT lock_until FROM charities WHERE chain_id = ?1 AND status = 'Confirmed'",
        )
        .bind(charity_chain_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(row.try_get::<Option<DateTime<Utc>>, _>("lock_until")?),
            None => Ok(None),
        }
    }

    /// Every row still `Pending`, across all tables, oldest first
    pub async fn pending_records(&self) -> Result<Vec<PendingRecord>> {
        let mut pending = Vec::new();
        for kind in RecordKind::all() {
            let sql = format!(
                "SELECT id, tx_ref, created_at FROM {} WHERE status = 'Pending'",
                kind.table()
            );
            for row in sqlx::query(&sql).fetch_all(&self.pool).await? {
                let id = Uuid::parse_str(&row.try_get::<String, _>("id")?)
                    .map_err(|e| EngineError::Internal(format!("stored uuid unparsable: {}", e)))?;
                pending.push(PendingRecord {
                    kind,
                    id,
                    tx_ref: row.try_get("tx_ref")?,
                    created_at: row.try_get("created_at")?,
                });
            }
        }
        pending.sort_by_key(|r| r.created_at);
        Ok(pending)
    }

    /// Confirmed, still-active campaigns whose end time has passed
    pub async fn campaigns_past_end(&self, now: DateTime<Utc>) -> Result<Vec<u64>> {
        let rows = sqlx::query(
            "SELECT chain_id FROM campaigns c
             WHERE c.status = 'Confirmed' AND c.campaign_status = 'Active'
               AND c.end_at IS NOT NULL AND c.end_at <= ?1
               AND NOT EXISTS (
                   SELECT 1 FROM campaign_status_changes s
                   WHERE s.campaign_chain_id = c.chain_id AND s.status = 'Pending')",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(chain_id) = chain_id_from(row.try_get("chain_id")?) {
                ids.push(chain_id);
            }
        }
        Ok(ids)
    }

    pub async fn donation_record(&self, id: Uuid) -> Result<Option<DonationRecord>> {
        let row = sqlx::query("SELECT * FROM donations WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(donation_from_row).transpose()
    }

    pub async fn withdrawal_record(&self, id: Uuid) -> Result<Option<WithdrawalRecord>> {
        let row = sqlx::query("SELECT * FROM withdrawals WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(withdrawal_from_row).transpose()
    }

    pub async fn allocation_record(&self, id: Uuid) -> Result<Option<AllocationRecord>> {
        let row = sqlx::query("SELECT * FROM allocation_events WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(allocation_from_row).transpose()
    }

    pub async fn status_change_record(
        &self,
        id: Uuid,
    ) -> Result<Option<CampaignStatusChangeRecord>> {
        let row = sqlx::query("SELECT * FROM campaign_status_changes WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(status_change_from_row).transpose()
    }
}

fn parse_status(s: String) -> Result<RecordStatus> {
    RecordStatus::from_str(&s)
        .ok_or_else(|| EngineError::Internal(format!("unknown record status '{}'", s)))
}

fn parse_campaign_status(s: String) -> Result<CampaignStatus> {
    CampaignStatus::from_str(&s)
        .ok_or_else(|| EngineError::Internal(format!("unknown campaign status '{}'", s)))
}

fn parse_uuid(s: String) -> Result<Uuid> {
    Uuid::parse_str(&s).map_err(|e| EngineError::Internal(format!("stored uuid unparsable: {}", e)))
}

fn charity_from_row(row: sqlx::sqlite::SqliteRow) -> Result<CharityRecord> {
    Ok(CharityRecord {
        id: parse_uuid(row.try_get("id")?)?,
        chain_id: chain_id_from(row.try_get("chain_id")?),
        wallet: row.try_get("wallet")?,
        name: row.try_get("name")?,
        metadata_ref: row.try_get("metadata_ref")?,
        total_raised_usd: parse_decimal(&row.try_get::<String, _>("total_raised_usd")?)?,
        lock_until: row.try_get("lock_until")?,
        status: parse_status(row.try_get("status")?)?,
        tx_ref: row.try_get("tx_ref")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn campaign_from_row(row: sqlx::sqlite::SqliteRow) -> Result<CampaignRecord> {
    Ok(CampaignRecord {
        id: parse_uuid(row.try_get("id")?)?,
        chain_id: chain_id_from(row.try_get("chain_id")?),
        charity_chain_id: row.try_get::<i64, _>("charity_chain_id")? as u64,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        goal_amount: parse_decimal(&row.try_get::<String, _>("goal_amount")?)?,
        raised_usd: parse_decimal(&row.try_get::<String, _>("raised_usd")?)?,
        allocated_usd: parse_decimal(&row.try_get::<String, _>("allocated_usd")?)?,
        campaign_status: parse_campaign_status(row.try_get("campaign_status")?)?,
        start_at: row.try_get("start_at")?,
        end_at: row.try_get("end_at")?,
        status: parse_status(row.try_get("status")?)?,
        tx_ref: row.try_get("tx_ref")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn donation_from_row(row: sqlx::sqlite::SqliteRow) -> Result<DonationRecord> {
    Ok(DonationRecord {
        id: parse_uuid(row.try_get("id")?)?,
        chain_id: chain_id_from(row.try_get("chain_id")?),
        campaign_chain_id: row.try_get::<i64, _>("campaign_chain_id")? as u64,
        donor: row.try_get("donor")?,
        asset_code: row.try_get("asset_code")?,
        amount: parse_decimal(&row.try_get::<String, _>("amount")?)?,
        fiat_amount_usd: parse_decimal(&row.try_get::<String, _>("fiat_amount_usd")?)?,
        status: parse_status(row.try_get("status")?)?,
        tx_ref: row.try_get("tx_ref")?,
        created_at: row.try_get("created_at")?,
    })
}

fn allocation_from_row(row: sqlx::sqlite::SqliteRow) -> Result<AllocationRecord> {
    Ok(AllocationRecord {
        id: parse_uuid(row.try_get("id")?)?,
        chain_id: chain_id_from(row.try_get("chain_id")?),
        campaign_chain_id: row.try_get::<i64, _>("campaign_chain_id")? as u64,
        amount_usd: parse_decimal(&row.try_get::<String, _>("amount_usd")?)?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: parse_status(row.try_get("status")?)?,
        tx_ref: row.try_get("tx_ref")?,
        created_at: row.try_get("created_at")?,
    })
}

fn withdrawal_from_row(row: sqlx::sqlite::SqliteRow) -> Result<WithdrawalRecord> {
    Ok(WithdrawalRecord {
        id: parse_uuid(row.try_get("id")?)?,
        charity_chain_id: row.try_get::<i64, _>("charity_chain_id")? as u64,
        asset_code: row.try_get("asset_code")?,
        amount: parse_decimal(&row.try_get::<String, _>("amount")?)?,
        caller: row.try_get("caller")?,
        status: parse_status(row.try_get("status")?)?,
        tx_ref: row.try_get("tx_ref")?,
        created_at: row.try_get("created_at")?,
    })
}

fn status_change_from_row(row: sqlx::sqlite::SqliteRow) -> Result<CampaignStatusChangeRecord> {
    Ok(CampaignStatusChangeRecord {
        id: parse_uuid(row.try_get("id")?)?,
        campaign_chain_id: row.try_get::<i64, _>("campaign_chain_id")? as u64,
        new_status: parse_campaign_status(row.try_get("new_status")?)?,
        status: parse_status(row.try_get("status")?)?,
        tx_ref: row.try_get("tx_ref")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn confirm_charity(store: &MirrorStore, chain_id: u64) -> Uuid {
        let mut tx = store.begin().await.unwrap();
        let (kind, id) = store
            .stage(
                &mut tx,
                &StagedWrite::Charity {
                    wallet: "0xcharity".into(),
                    name: "Food Bank".into(),
                    metadata_ref: String::new(),
                },
            )
            .await
            .unwrap();
        store
            .confirm_record(
                &mut tx,
                kind,
                id,
                &OpReceipt::CharityRegistered { charity_id: chain_id },
                Utc::now(),
                0,
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();
        id
    }

    async fn confirm_campaign(store: &MirrorStore, charity_chain_id: u64, chain_id: u64) -> Uuid {
        let mut tx = store.begin().await.unwrap();
        let (kind, id) = store
            .stage(
                &mut tx,
                &StagedWrite::Campaign {
                    charity_chain_id,
                    title: "Winter Drive".into(),
                    description: String::new(),
                    goal_amount: dec!(1000),
                    start_at: Utc::now(),
                    end_at: None,
                },
            )
            .await
            .unwrap();
        store
            .confirm_record(
                &mut tx,
                kind,
                id,
                &OpReceipt::CampaignCreated { campaign_id: chain_id },
                Utc::now(),
                0,
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();
        id
    }

    async fn confirm_donation(
        store: &MirrorStore,
        campaign_chain_id: u64,
        charity_chain_id: u64,
        donor: &str,
        fiat: Decimal,
        donation_chain_id: u64,
    ) {
        let mut tx = store.begin().await.unwrap();
        let (kind, id) = store
            .stage(
                &mut tx,
                &StagedWrite::Donation {
                    campaign_chain_id,
                    donor: donor.into(),
                    asset_code: "native".into(),
                    amount: dec!(0.01),
                    fiat_amount_usd: fiat,
                },
            )
            .await
            .unwrap();
        store
            .confirm_record(
                &mut tx,
                kind,
                id,
                &OpReceipt::DonationRecorded {
                    donation_id: donation_chain_id,
                    charity_id: charity_chain_id,
                },
                Utc::now(),
                86_400,
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_confirmed_donations_drive_aggregates() {
        let store = MirrorStore::connect_in_memory().await.unwrap();
        confirm_charity(&store, 1).await;
        confirm_campaign(&store, 1, 1).await;

        confirm_donation(&store, 1, 1, "0xalice", dec!(50), 1).await;
        confirm_donation(&store, 1, 1, "0xbob", dec!(25.50), 2).await;
        confirm_donation(&store, 1, 1, "0xalice", dec!(10), 3).await;

        let util = store.utilization(1).await.unwrap().unwrap();
        assert_eq!(util.raised_usd, dec!(85.50));
        assert_eq!(util.allocated_usd, dec!(0));
        assert_eq!(util.remaining_usd, dec!(85.50));
        assert_eq!(util.donor_count, 2);

        let charity = store.charity_by_chain_id(1).await.unwrap().unwrap();
        assert_eq!(charity.total_raised_usd, dec!(85.50));
        assert!(charity.lock_until.is_some());

        assert_eq!(store.confirmed_balance(1, "native").await.unwrap(), dec!(0.03));
    }

    #[tokio::test]
    async fn test_pending_rows_invisible_to_reads() {
        let store = MirrorStore::connect_in_memory().await.unwrap();
        confirm_charity(&store, 1).await;
        confirm_campaign(&store, 1, 1).await;

        let mut tx = store.begin().await.unwrap();
        store
            .stage(
                &mut tx,
                &StagedWrite::Donation {
                    campaign_chain_id: 1,
                    donor: "0xalice".into(),
                    asset_code: "native".into(),
                    amount: dec!(0.01),
                    fiat_amount_usd: dec!(50),
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let util = store.utilization(1).await.unwrap().unwrap();
        assert_eq!(util.raised_usd, dec!(0));
        assert_eq!(util.donor_count, 0);

        let pending = store.pending_records().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, RecordKind::Donation);
    }

    #[tokio::test]
    async fn test_confirm_is_idempotent() {
        let store = MirrorStore::connect_in_memory().await.unwrap();
        confirm_charity(&store, 1).await;
        confirm_campaign(&store, 1, 1).await;

        let mut tx = store.begin().await.unwrap();
        let (kind, id) = store
            .stage(
                &mut tx,
                &StagedWrite::Donation {
                    campaign_chain_id: 1,
                    donor: "0xalice".into(),
                    asset_code: "native".into(),
                    amount: dec!(0.01),
                    fiat_amount_usd: dec!(50),
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let receipt = OpReceipt::DonationRecorded {
            donation_id: 1,
            charity_id: 1,
        };

        let mut tx = store.begin().await.unwrap();
        assert!(store
            .confirm_record(&mut tx, kind, id, &receipt, Utc::now(), 0)
            .await
            .unwrap());
        tx.commit().await.unwrap();

        // Second resolution is a no-op, aggregates unchanged
        let mut tx = store.begin().await.unwrap();
        assert!(!store
            .confirm_record(&mut tx, kind, id, &receipt, Utc::now(), 0)
            .await
            .unwrap());
        tx.commit().await.unwrap();

        let util = store.utilization(1).await.unwrap().unwrap();
        assert_eq!(util.raised_usd, dec!(50));
    }

    #[tokio::test]
    async fn test_failed_record_excluded_everywhere() {
        let store = MirrorStore::connect_in_memory().await.unwrap();
        confirm_charity(&store, 1).await;
        confirm_campaign(&store, 1, 1).await;

        let mut tx = store.begin().await.unwrap();
        let (kind, id) = store
            .stage(
                &mut tx,
                &StagedWrite::Donation {
                    campaign_chain_id: 1,
                    donor: "0xalice".into(),
                    asset_code: "native".into(),
                    amount: dec!(0.01),
                    fiat_amount_usd: dec!(50),
                },
            )
            .await
            .unwrap();
        store.fail_record(&mut tx, kind, id).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.pending_records().await.unwrap().is_empty());
        let util = store.utilization(1).await.unwrap().unwrap();
        assert_eq!(util.raised_usd, dec!(0));
    }

    #[tokio::test]
    async fn test_campaign_end_flows_through_status_change() {
        let store = MirrorStore::connect_in_memory().await.unwrap();
        confirm_charity(&store, 1).await;
        confirm_campaign(&store, 1, 1).await;

        let mut tx = store.begin().await.unwrap();
        let (kind, id) = store
            .stage(&mut tx, &StagedWrite::CampaignEnd { campaign_chain_id: 1 })
            .await
            .unwrap();
        store
            .confirm_record(
                &mut tx,
                kind,
                id,
                &OpReceipt::CampaignEnded { campaign_id: 1 },
                Utc::now(),
                0,
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let campaign = store.campaign_by_chain_id(1).await.unwrap().unwrap();
        assert_eq!(campaign.campaign_status, CampaignStatus::Ended);
    }
}
