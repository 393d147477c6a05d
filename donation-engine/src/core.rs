//! Engine facade
//!
//! One [`DonationCore`] owns the whole pipeline: guard checks against the
//! confirmed mirror, the single-writer sequencer, and the saga runner.
//! Construction spawns the sequencer worker; dropping the core lets the
//! worker drain and exit.

use chrono::{DateTime, Utc};
use ledger_contract::{Address, AdminKeypair, Asset, ChainOperation};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::chain::{ChainClient, ChainProvider};
use crate::config::Config;
use crate::errors::Result;
use crate::guard::Guard;
use crate::metrics::EngineMetrics;
use crate::mirror::{MirrorStore, StagedWrite};
use crate::models::{CampaignRecord, CampaignUtilization, CharityRecord};
use crate::reconcile::{OpRef, Reconciler, SweepReport};
use crate::sequencer::spawn_sequencer;

pub struct DonationCore<P: ChainProvider> {
    store: MirrorStore,
    guard: Guard,
    reconciler: Reconciler<P>,
    metrics: Arc<EngineMetrics>,
}

impl<P: ChainProvider + 'static> DonationCore<P> {
    pub fn new(
        store: MirrorStore,
        provider: Arc<P>,
        keypair: AdminKeypair,
        config: &Config,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let admin = keypair.address();
        let client = ChainClient::new(
            provider.clone(),
            keypair,
            Duration::from_millis(config.chain.finality_deadline_ms),
        );
        let (sequencer, _worker) = spawn_sequencer(client, config.sequencer.capacity, metrics.clone());

        let guard = Guard::new(
            store.clone(),
            admin,
            config.contract.min_native_donation,
            config
                .contract
                .accepted_tokens
                .iter()
                .map(Address::new)
                .collect(),
        );
        let reconciler = Reconciler::new(
            store.clone(),
            sequencer,
            provider,
            metrics.clone(),
            config.contract.withdrawal_cooldown_secs,
            config.reconciliation.pending_grace_secs,
        );

        Self {
            store,
            guard,
            reconciler,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn store(&self) -> &MirrorStore {
        &self.store
    }

    // ── Operations ──────────────────────────────────────────────────

    pub async fn register_charity(
        &self,
        wallet: Address,
        name: String,
        metadata_ref: String,
    ) -> Result<OpRef> {
        self.guard.check_charity_registration(&wallet)?;
        let write = StagedWrite::Charity {
            wallet: wallet.as_str().to_string(),
            name: name.clone(),
            metadata_ref: metadata_ref.clone(),
        };
        let operation = ChainOperation::RegisterCharity {
            wallet,
            name,
            metadata_ref,
        };
        self.reconciler.run_saga(write, operation).await
    }

    pub async fn create_campaign(
        &self,
        charity_chain_id: u64,
        title: String,
        description: String,
        goal_amount: Decimal,
        start_at: DateTime<Utc>,
        end_at: Option<DateTime<Utc>>,
    ) -> Result<OpRef> {
        self.guard
            .check_campaign_creation(charity_chain_id, &title, goal_amount, start_at, end_at)
            .await?;
        let write = StagedWrite::Campaign {
            charity_chain_id,
            title: title.clone(),
            description: description.clone(),
            goal_amount,
            start_at,
            end_at,
        };
        let operation = ChainOperation::CreateCampaign {
            charity_id: charity_chain_id,
            title,
            description,
            goal_amount,
            start_at,
            end_at,
        };
        self.reconciler.run_saga(write, operation).await
    }

    /// Record a donation. `fiat_amount_usd` is the caller-reported USD
    /// equivalent; this engine does not price assets.
    pub async fn donate(
        &self,
        campaign_chain_id: u64,
        donor: Address,
        asset: Asset,
        amount: Decimal,
        min_amount: Option<Decimal>,
        fiat_amount_usd: Decimal,
    ) -> Result<OpRef> {
        self.guard
            .check_donation(campaign_chain_id, &donor, &asset, amount, fiat_amount_usd)
            .await?;
        let write = StagedWrite::Donation {
            campaign_chain_id,
            donor: donor.as_str().to_string(),
            asset_code: asset.code(),
            amount,
            fiat_amount_usd,
        };
        let operation = match asset {
            Asset::Native => ChainOperation::DonateNative {
                campaign_id: campaign_chain_id,
                donor,
                value: amount,
                fiat_amount_usd,
            },
            Asset::Erc20(token) => ChainOperation::DonateErc20 {
                campaign_id: campaign_chain_id,
                donor,
                token,
                amount,
                min_amount: min_amount.unwrap_or(amount),
                fiat_amount_usd,
            },
        };
        self.reconciler.run_saga(write, operation).await
    }

    pub async fn create_allocation_event(
        &self,
        campaign_chain_id: u64,
        amount_usd: Decimal,
        title: String,
        description: String,
    ) -> Result<OpRef> {
        self.guard
            .check_allocation(campaign_chain_id, amount_usd, &title)
            .await?;
        let write = StagedWrite::Allocation {
            campaign_chain_id,
            amount_usd,
            title: title.clone(),
            description: description.clone(),
        };
        let operation = ChainOperation::CreateAllocationEvent {
            campaign_id: campaign_chain_id,
            amount_usd,
            title,
            description,
        };
        self.reconciler.run_saga(write, operation).await
    }

    pub async fn withdraw(
        &self,
        charity_chain_id: u64,
        asset: Asset,
        amount: Decimal,
        caller: Address,
    ) -> Result<OpRef> {
        self.guard
            .check_withdrawal(charity_chain_id, &caller, &asset, amount, Utc::now())
            .await?;
        let write = StagedWrite::Withdrawal {
            charity_chain_id,
            asset_code: asset.code(),
            amount,
            caller: caller.as_str().to_string(),
        };
        let operation = ChainOperation::Withdraw {
            charity_id: charity_chain_id,
            asset,
            amount,
            caller,
        };
        self.reconciler.run_saga(write, operation).await
    }

    pub async fn end_campaign(&self, campaign_chain_id: u64) -> Result<OpRef> {
        self.guard.check_campaign_end(campaign_chain_id).await?;
        let write = StagedWrite::CampaignEnd { campaign_chain_id };
        let operation = ChainOperation::EndCampaign {
            campaign_id: campaign_chain_id,
        };
        self.reconciler.run_saga(write, operation).await
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub async fn charity(&self, charity_chain_id: u64) -> Result<Option<CharityRecord>> {
        self.store.charity_by_chain_id(charity_chain_id).await
    }

    pub async fn campaign(&self, campaign_chain_id: u64) -> Result<Option<CampaignRecord>> {
        self.store.campaign_by_chain_id(campaign_chain_id).await
    }

    pub async fn campaign_utilization(
        &self,
        campaign_chain_id: u64,
    ) -> Result<Option<CampaignUtilization>> {
        self.store.utilization(campaign_chain_id).await
    }

    pub async fn charity_balance(
        &self,
        charity_chain_id: u64,
        asset: &Asset,
    ) -> Result<Decimal> {
        self.store
            .confirmed_balance(charity_chain_id, &asset.code())
            .await
    }

    // ── Background work ─────────────────────────────────────────────

    /// One sweep pass over rows left `Pending`
    pub async fn reconcile_pending(&self) -> Result<SweepReport> {
        self.reconciler.resolve_pending(Utc::now()).await
    }

    /// End every confirmed campaign whose end time has passed.
    /// Best-effort per campaign; one failure does not stop the rest.
    pub async fn end_expired_campaigns(&self) -> Result<usize> {
        let due = self.store.campaigns_past_end(Utc::now()).await?;
        let mut ended = 0;
        for campaign_chain_id in due {
            match self.end_campaign(campaign_chain_id).await {
                Ok(_) => {
                    info!(campaign_chain_id, "Ended expired campaign");
                    ended += 1;
                }
                Err(e) => {
                    warn!(campaign_chain_id, error = %e, "Failed to end expired campaign");
                }
            }
        }
        Ok(ended)
    }
}
