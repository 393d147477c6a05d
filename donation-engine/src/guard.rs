//! Pre-submission validation against the confirmed mirror view
//!
//! The guard fast-fails requests that the chain would reject anyway, and
//! enforces the one rule the chain cannot: allocation claims are capped
//! by *confirmed* fiat totals, which only the mirror tracks. Everything
//! else here is advisory; the chain simulation remains the authority.

use chrono::{DateTime, Utc};
use ledger_contract::{authorize_withdrawal, Address, Asset, CampaignStatus, ContractError};
use rust_decimal::Decimal;

use crate::errors::{EngineError, Result};
use crate::mirror::MirrorStore;
use crate::models::CampaignRecord;

pub struct Guard {
    store: MirrorStore,
    admin: Address,
    min_native_donation: Decimal,
    accepted_tokens: Vec<Address>,
}

impl Guard {
    pub fn new(
        store: MirrorStore,
        admin: Address,
        min_native_donation: Decimal,
        accepted_tokens: Vec<Address>,
    ) -> Self {
        Self {
            store,
            admin,
            min_native_donation,
            accepted_tokens,
        }
    }

    async fn active_campaign(&self, campaign_chain_id: u64) -> Result<CampaignRecord> {
        let campaign = self
            .store
            .campaign_by_chain_id(campaign_chain_id)
            .await?
            .ok_or(EngineError::Rejected(ContractError::CampaignNotFound(
                campaign_chain_id,
            )))?;
        if campaign.campaign_status != CampaignStatus::Active {
            return Err(EngineError::Rejected(ContractError::CampaignNotActive {
                campaign_id: campaign_chain_id,
                status: campaign.campaign_status,
            }));
        }
        Ok(campaign)
    }

    pub fn check_charity_registration(&self, wallet: &Address) -> Result<()> {
        if wallet.is_zero() {
            return Err(EngineError::Rejected(ContractError::ZeroWallet));
        }
        Ok(())
    }

    pub async fn check_campaign_creation(
        &self,
        charity_chain_id: u64,
        title: &str,
        goal_amount: Decimal,
        start_at: DateTime<Utc>,
        end_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if self
            .store
            .charity_by_chain_id(charity_chain_id)
            .await?
            .is_none()
        {
            return Err(EngineError::Rejected(ContractError::CharityNotFound(
                charity_chain_id,
            )));
        }
        if title.trim().is_empty() {
            return Err(EngineError::Rejected(ContractError::EmptyTitle));
        }
        if goal_amount <= Decimal::ZERO {
            return Err(EngineError::Rejected(ContractError::InvalidAmount(
                goal_amount,
            )));
        }
        if let Some(end) = end_at {
            if end <= start_at {
                return Err(EngineError::Rejected(ContractError::InvalidSchedule {
                    start_at,
                    end_at: end,
                }));
            }
        }
        Ok(())
    }

    pub async fn check_donation(
        &self,
        campaign_chain_id: u64,
        donor: &Address,
        asset: &Asset,
        amount: Decimal,
        fiat_amount_usd: Decimal,
    ) -> Result<()> {
        self.active_campaign(campaign_chain_id).await?;
        if donor.is_zero() {
            return Err(EngineError::Rejected(ContractError::ZeroWallet));
        }
        if fiat_amount_usd <= Decimal::ZERO {
            return Err(EngineError::Rejected(ContractError::InvalidFiatAmount(
                fiat_amount_usd,
            )));
        }
        match asset {
            Asset::Native => {
                if amount < self.min_native_donation {
                    return Err(EngineError::Rejected(ContractError::BelowDustThreshold {
                        value: amount,
                        minimum: self.min_native_donation,
                    }));
                }
            }
            Asset::Erc20(token) => {
                if !self.accepted_tokens.contains(token) {
                    return Err(EngineError::Rejected(ContractError::TokenNotAccepted(
                        token.clone(),
                    )));
                }
                if amount <= Decimal::ZERO {
                    return Err(EngineError::Rejected(ContractError::InvalidAmount(amount)));
                }
            }
        }
        Ok(())
    }

    /// Allocation claims draw on confirmed raised funds only; pending
    /// donations do not count toward the cap. Claims on the other side of
    /// the ledger reserve their funds while still `Pending`: a claim whose
    /// finality timed out may yet confirm through the sweep, and a second
    /// claim against the same funds would otherwise push the confirmed
    /// total past what was raised once both settle.
    pub async fn check_allocation(
        &self,
        campaign_chain_id: u64,
        amount_usd: Decimal,
        title: &str,
    ) -> Result<()> {
        // Allocations remain valid after a campaign ends
        let campaign = self
            .store
            .campaign_by_chain_id(campaign_chain_id)
            .await?
            .ok_or(EngineError::Rejected(ContractError::CampaignNotFound(
                campaign_chain_id,
            )))?;
        if title.trim().is_empty() {
            return Err(EngineError::Rejected(ContractError::EmptyTitle));
        }
        if amount_usd <= Decimal::ZERO {
            return Err(EngineError::Rejected(ContractError::InvalidAmount(
                amount_usd,
            )));
        }
        let reserved = self
            .store
            .reserved_allocation_total(campaign_chain_id)
            .await?;
        let remaining = campaign.raised_usd - reserved;
        if amount_usd > remaining {
            return Err(EngineError::AllocationExceedsRemaining {
                campaign_id: campaign_chain_id,
                requested: amount_usd,
                remaining,
            });
        }
        Ok(())
    }

    pub async fn check_withdrawal(
        &self,
        charity_chain_id: u64,
        caller: &Address,
        asset: &Asset,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let charity = self
            .store
            .charity_by_chain_id(charity_chain_id)
            .await?
            .ok_or(EngineError::Rejected(ContractError::CharityNotFound(
                charity_chain_id,
            )))?;

        let wallet = Address::new(charity.wallet.clone());
        if !authorize_withdrawal(&wallet, caller, &self.admin) {
            return Err(EngineError::Rejected(ContractError::Unauthorized {
                charity_id: charity_chain_id,
                caller: caller.clone(),
            }));
        }
        if let Some(until) = charity.lock_until {
            if now < until {
                return Err(EngineError::Rejected(ContractError::WithdrawalLocked {
                    charity_id: charity_chain_id,
                    until,
                }));
            }
        }
        if amount <= Decimal::ZERO {
            return Err(EngineError::Rejected(ContractError::InvalidAmount(amount)));
        }
        let available = self
            .store
            .confirmed_balance(charity_chain_id, &asset.code())
            .await?;
        if amount > available {
            return Err(EngineError::Rejected(ContractError::InsufficientBalance {
                charity_id: charity_chain_id,
                requested: amount,
                available,
            }));
        }
        Ok(())
    }

    pub async fn check_campaign_end(&self, campaign_chain_id: u64) -> Result<()> {
        self.active_campaign(campaign_chain_id).await?;
        Ok(())
    }
}
