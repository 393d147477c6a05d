//! The on-chain ledger state machine
//!
//! Charities, campaigns, donations and fund-allocation events live in
//! append-only arenas with 1-based monotonic ids. Balances and withdrawal
//! locks are derived state mutated only by confirmed operations.
//!
//! The contract is deterministic and does no I/O; chain time is supplied by
//! the executing environment through `now`.

use crate::error::{ContractError, Result};
use crate::types::{
    Address, AllocationEvent, AllocationEventId, Asset, Campaign, CampaignId, CampaignStatus,
    ChainOperation, Charity, CharityId, Donation, DonationId, OpReceipt,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Contract-level parameters fixed at deployment
#[derive(Debug, Clone)]
pub struct ContractParams {
    /// Minimum accepted native donation value (dust threshold)
    pub min_native_donation: Decimal,
    /// Seconds a charity must wait after its latest donation before
    /// withdrawing
    pub withdrawal_cooldown_secs: i64,
    /// ERC20 tokens accepted for donations
    pub accepted_tokens: Vec<Address>,
}

impl Default for ContractParams {
    fn default() -> Self {
        Self {
            // 0.0001 native units
            min_native_donation: Decimal::new(1, 4),
            withdrawal_cooldown_secs: 86_400,
            accepted_tokens: Vec::new(),
        }
    }
}

/// Pure capability check for withdrawals: the charity wallet or the
/// administrative identity may withdraw, nobody else
pub fn authorize_withdrawal(charity_wallet: &Address, caller: &Address, admin: &Address) -> bool {
    caller == charity_wallet || caller == admin
}

/// The ledger contract state
#[derive(Debug, Clone)]
pub struct LedgerContract {
    admin: Address,
    params: ContractParams,
    charities: Vec<Charity>,
    campaigns: Vec<Campaign>,
    donations: Vec<Donation>,
    allocation_events: Vec<AllocationEvent>,
    balances: HashMap<(CharityId, Asset), Decimal>,
    withdrawal_locks: HashMap<CharityId, DateTime<Utc>>,
}

impl LedgerContract {
    /// Deploy a fresh contract owned by the administrative identity
    pub fn new(admin: Address, params: ContractParams) -> Self {
        Self {
            admin,
            params,
            charities: Vec::new(),
            campaigns: Vec::new(),
            donations: Vec::new(),
            allocation_events: Vec::new(),
            balances: HashMap::new(),
            withdrawal_locks: HashMap::new(),
        }
    }

    /// Administrative identity
    pub fn admin(&self) -> &Address {
        &self.admin
    }

    /// Deployment parameters
    pub fn params(&self) -> &ContractParams {
        &self.params
    }

    /// Execute an operation at chain time `now`
    pub fn apply(&mut self, operation: &ChainOperation, now: DateTime<Utc>) -> Result<OpReceipt> {
        match operation {
            ChainOperation::RegisterCharity {
                wallet,
                name,
                metadata_ref,
            } => self.register_charity(wallet.clone(), name.clone(), metadata_ref.clone(), now),
            ChainOperation::CreateCampaign {
                charity_id,
                title,
                description,
                goal_amount,
                start_at,
                end_at,
            } => self.create_campaign(
                *charity_id,
                title.clone(),
                description.clone(),
                *goal_amount,
                *start_at,
                *end_at,
                now,
            ),
            ChainOperation::DonateNative {
                campaign_id,
                donor,
                value,
                fiat_amount_usd,
            } => self.donate(
                *campaign_id,
                donor.clone(),
                Asset::Native,
                *value,
                *fiat_amount_usd,
                now,
            ),
            ChainOperation::DonateErc20 {
                campaign_id,
                donor,
                token,
                amount,
                min_amount,
                fiat_amount_usd,
            } => {
                if !self.params.accepted_tokens.contains(token) {
                    return Err(ContractError::TokenNotAccepted(token.clone()));
                }
                if amount < min_amount {
                    return Err(ContractError::BelowMinAmount {
                        amount: *amount,
                        min_amount: *min_amount,
                    });
                }
                self.donate(
                    *campaign_id,
                    donor.clone(),
                    Asset::Erc20(token.clone()),
                    *amount,
                    *fiat_amount_usd,
                    now,
                )
            }
            ChainOperation::CreateAllocationEvent {
                campaign_id,
                amount_usd,
                title,
                description,
            } => self.create_allocation_event(
                *campaign_id,
                *amount_usd,
                title.clone(),
                description.clone(),
                now,
            ),
            ChainOperation::Withdraw {
                charity_id,
                asset,
                amount,
                caller,
            } => self.withdraw(*charity_id, asset.clone(), *amount, caller, now),
            ChainOperation::EndCampaign { campaign_id } => self.end_campaign(*campaign_id),
        }
    }

    fn register_charity(
        &mut self,
        wallet: Address,
        name: String,
        metadata_ref: String,
        now: DateTime<Utc>,
    ) -> Result<OpReceipt> {
        if wallet.is_zero() {
            return Err(ContractError::ZeroWallet);
        }

        let charity_id = self.charities.len() as CharityId + 1;
        self.charities.push(Charity {
            id: charity_id,
            wallet,
            name,
            metadata_ref,
            approved: true,
            created_at: now,
        });

        Ok(OpReceipt::CharityRegistered { charity_id })
    }

    #[allow(clippy::too_many_arguments)]
    fn create_campaign(
        &mut self,
        charity_id: CharityId,
        title: String,
        description: String,
        goal_amount: Decimal,
        start_at: DateTime<Utc>,
        end_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<OpReceipt> {
        let charity = self.charity(charity_id)?;
        if !charity.approved {
            return Err(ContractError::CharityNotApproved(charity_id));
        }
        if let Some(end) = end_at {
            if end <= start_at {
                return Err(ContractError::InvalidSchedule { start_at, end_at: end });
            }
        }
        if goal_amount <= Decimal::ZERO {
            return Err(ContractError::InvalidAmount(goal_amount));
        }

        let campaign_id = self.campaigns.len() as CampaignId + 1;
        self.campaigns.push(Campaign {
            id: campaign_id,
            charity_id,
            title,
            description,
            goal_amount,
            start_at,
            end_at,
            // Creation implies activation
            status: CampaignStatus::Active,
            created_at: now,
        });

        Ok(OpReceipt::CampaignCreated { campaign_id })
    }

    fn donate(
        &mut self,
        campaign_id: CampaignId,
        donor: Address,
        asset: Asset,
        amount: Decimal,
        fiat_amount_usd: Decimal,
        now: DateTime<Utc>,
    ) -> Result<OpReceipt> {
        let campaign = self.campaign(campaign_id)?;
        if campaign.status != CampaignStatus::Active {
            return Err(ContractError::CampaignNotActive {
                campaign_id,
                status: campaign.status,
            });
        }
        if asset == Asset::Native && amount < self.params.min_native_donation {
            return Err(ContractError::BelowDustThreshold {
                value: amount,
                minimum: self.params.min_native_donation,
            });
        }
        if amount <= Decimal::ZERO {
            return Err(ContractError::InvalidAmount(amount));
        }
        if fiat_amount_usd <= Decimal::ZERO {
            return Err(ContractError::InvalidFiatAmount(fiat_amount_usd));
        }

        let charity_id = campaign.charity_id;
        let donation_id = self.donations.len() as DonationId + 1;
        self.donations.push(Donation {
            id: donation_id,
            donor,
            charity_id,
            campaign_id,
            asset: asset.clone(),
            amount,
            fiat_amount_usd,
            at: now,
        });

        let balance = self
            .balances
            .entry((charity_id, asset))
            .or_insert(Decimal::ZERO);
        *balance += amount;

        // Every donation re-arms the withdrawal timelock
        let cooldown = Duration::seconds(self.params.withdrawal_cooldown_secs);
        self.withdrawal_locks.insert(charity_id, now + cooldown);

        Ok(OpReceipt::DonationRecorded {
            donation_id,
            charity_id,
        })
    }

    fn create_allocation_event(
        &mut self,
        campaign_id: CampaignId,
        amount_usd: Decimal,
        title: String,
        description: String,
        now: DateTime<Utc>,
    ) -> Result<OpReceipt> {
        let campaign = self.campaign(campaign_id)?;
        // Allocation events remain valid after a campaign ends: they claim
        // against already-raised funds. Only a never-activated campaign
        // rejects them.
        if campaign.status == CampaignStatus::Created {
            return Err(ContractError::CampaignNotActive {
                campaign_id,
                status: campaign.status,
            });
        }
        if amount_usd <= Decimal::ZERO {
            return Err(ContractError::InvalidAmount(amount_usd));
        }
        if title.trim().is_empty() {
            return Err(ContractError::EmptyTitle);
        }

        // The remaining-funds check is deliberately not performed here; the
        // off-chain guard enforces it before submission. The contract only
        // records the claim.
        let event_id = self.allocation_events.len() as AllocationEventId + 1;
        self.allocation_events.push(AllocationEvent {
            id: event_id,
            campaign_id,
            amount_usd,
            title,
            description,
            at: now,
        });

        Ok(OpReceipt::AllocationRecorded { event_id })
    }

    fn withdraw(
        &mut self,
        charity_id: CharityId,
        asset: Asset,
        amount: Decimal,
        caller: &Address,
        now: DateTime<Utc>,
    ) -> Result<OpReceipt> {
        let wallet = self.charity(charity_id)?.wallet.clone();
        if !authorize_withdrawal(&wallet, caller, &self.admin) {
            return Err(ContractError::Unauthorized {
                charity_id,
                caller: caller.clone(),
            });
        }
        if let Some(until) = self.withdrawal_locks.get(&charity_id) {
            if now < *until {
                return Err(ContractError::WithdrawalLocked {
                    charity_id,
                    until: *until,
                });
            }
        }
        if amount <= Decimal::ZERO {
            return Err(ContractError::InvalidAmount(amount));
        }

        let available = self
            .balances
            .get(&(charity_id, asset.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO);
        if amount > available {
            return Err(ContractError::InsufficientBalance {
                charity_id,
                requested: amount,
                available,
            });
        }

        // Balance decremented before the external transfer (reentrancy guard)
        let remaining = available - amount;
        self.balances.insert((charity_id, asset), remaining);

        Ok(OpReceipt::WithdrawalExecuted {
            charity_id,
            remaining,
        })
    }

    fn end_campaign(&mut self, campaign_id: CampaignId) -> Result<OpReceipt> {
        let campaign = self.campaign_mut(campaign_id)?;
        if !campaign.status.can_transition_to(CampaignStatus::Ended) {
            return Err(ContractError::InvalidStatusTransition {
                from: campaign.status,
                to: CampaignStatus::Ended,
            });
        }
        campaign.status = CampaignStatus::Ended;

        Ok(OpReceipt::CampaignEnded { campaign_id })
    }

    // ----- read accessors -----

    /// Charity by id
    pub fn charity(&self, id: CharityId) -> Result<&Charity> {
        id.checked_sub(1)
            .and_then(|i| self.charities.get(i as usize))
            .ok_or(ContractError::CharityNotFound(id))
    }

    /// Campaign by id
    pub fn campaign(&self, id: CampaignId) -> Result<&Campaign> {
        id.checked_sub(1)
            .and_then(|i| self.campaigns.get(i as usize))
            .ok_or(ContractError::CampaignNotFound(id))
    }

    fn campaign_mut(&mut self, id: CampaignId) -> Result<&mut Campaign> {
        id.checked_sub(1)
            .and_then(|i| self.campaigns.get_mut(i as usize))
            .ok_or(ContractError::CampaignNotFound(id))
    }

    /// Donation by id
    pub fn donation(&self, id: DonationId) -> Option<&Donation> {
        id.checked_sub(1)
            .and_then(|i| self.donations.get(i as usize))
    }

    /// Confirmed balance for a charity/asset pair
    pub fn balance_of(&self, charity_id: CharityId, asset: &Asset) -> Decimal {
        self.balances
            .get(&(charity_id, asset.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Withdrawal lock expiry for a charity, if armed
    pub fn lock_until(&self, charity_id: CharityId) -> Option<DateTime<Utc>> {
        self.withdrawal_locks.get(&charity_id).copied()
    }

    /// Number of recorded donations
    pub fn donation_count(&self) -> u64 {
        self.donations.len() as u64
    }

    /// Number of recorded allocation events
    pub fn allocation_event_count(&self) -> u64 {
        self.allocation_events.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn admin() -> Address {
        Address::new("0xadmin")
    }

    fn contract() -> LedgerContract {
        let params = ContractParams {
            min_native_donation: dec!(0.0001),
            withdrawal_cooldown_secs: 3600,
            accepted_tokens: vec![Address::new("0xtoken")],
        };
        LedgerContract::new(admin(), params)
    }

    fn with_campaign() -> (LedgerContract, CharityId, CampaignId) {
        let mut c = contract();
        let receipt = c
            .apply(
                &ChainOperation::RegisterCharity {
                    wallet: Address::new("0xwallet1"),
                    name: "Clean Water".into(),
                    metadata_ref: "ipfs://meta".into(),
                },
                t0(),
            )
            .unwrap();
        let charity_id = match receipt {
            OpReceipt::CharityRegistered { charity_id } => charity_id,
            other => panic!("unexpected receipt: {other:?}"),
        };
        let receipt = c
            .apply(
                &ChainOperation::CreateCampaign {
                    charity_id,
                    title: "Wells".into(),
                    description: "Dig wells".into(),
                    goal_amount: dec!(1000),
                    start_at: t0(),
                    end_at: None,
                },
                t0(),
            )
            .unwrap();
        let campaign_id = match receipt {
            OpReceipt::CampaignCreated { campaign_id } => campaign_id,
            other => panic!("unexpected receipt: {other:?}"),
        };
        (c, charity_id, campaign_id)
    }

    fn donate(
        c: &mut LedgerContract,
        campaign_id: CampaignId,
        value: Decimal,
        fiat: Decimal,
        now: DateTime<Utc>,
    ) -> Result<OpReceipt> {
        c.apply(
            &ChainOperation::DonateNative {
                campaign_id,
                donor: Address::new("0xdonor"),
                value,
                fiat_amount_usd: fiat,
            },
            now,
        )
    }

    #[test]
    fn test_register_rejects_zero_wallet() {
        let mut c = contract();
        let err = c
            .apply(
                &ChainOperation::RegisterCharity {
                    wallet: Address::new("0x0"),
                    name: "X".into(),
                    metadata_ref: String::new(),
                },
                t0(),
            )
            .unwrap_err();
        assert_eq!(err, ContractError::ZeroWallet);
    }

    #[test]
    fn test_shared_wallet_allowed() {
        let mut c = contract();
        for _ in 0..3 {
            c.apply(
                &ChainOperation::RegisterCharity {
                    wallet: Address::new("0xshared"),
                    name: "X".into(),
                    metadata_ref: String::new(),
                },
                t0(),
            )
            .unwrap();
        }
        assert_eq!(c.charity(3).unwrap().wallet, Address::new("0xshared"));
    }

    #[test]
    fn test_campaign_ids_monotonic() {
        let (mut c, charity_id, first) = with_campaign();
        let receipt = c
            .apply(
                &ChainOperation::CreateCampaign {
                    charity_id,
                    title: "Second".into(),
                    description: String::new(),
                    goal_amount: dec!(10),
                    start_at: t0(),
                    end_at: None,
                },
                t0(),
            )
            .unwrap();
        assert_eq!(receipt, OpReceipt::CampaignCreated { campaign_id: first + 1 });
    }

    #[test]
    fn test_campaign_schedule_validation() {
        let (mut c, charity_id, _) = with_campaign();
        let err = c
            .apply(
                &ChainOperation::CreateCampaign {
                    charity_id,
                    title: "Bad".into(),
                    description: String::new(),
                    goal_amount: dec!(10),
                    start_at: t0(),
                    end_at: Some(t0()),
                },
                t0(),
            )
            .unwrap_err();
        assert!(matches!(err, ContractError::InvalidSchedule { .. }));
    }

    #[test]
    fn test_campaign_unknown_charity() {
        let mut c = contract();
        let err = c
            .apply(
                &ChainOperation::CreateCampaign {
                    charity_id: 99,
                    title: "X".into(),
                    description: String::new(),
                    goal_amount: dec!(10),
                    start_at: t0(),
                    end_at: None,
                },
                t0(),
            )
            .unwrap_err();
        assert_eq!(err, ContractError::CharityNotFound(99));
    }

    #[test]
    fn test_donation_updates_balance_and_lock() {
        let (mut c, charity_id, campaign_id) = with_campaign();
        donate(&mut c, campaign_id, dec!(0.01), dec!(50), t0()).unwrap();

        assert_eq!(c.balance_of(charity_id, &Asset::Native), dec!(0.01));
        assert_eq!(
            c.lock_until(charity_id),
            Some(t0() + Duration::seconds(3600))
        );
    }

    #[test]
    fn test_donation_dust_threshold() {
        let (mut c, _, campaign_id) = with_campaign();
        let err = donate(&mut c, campaign_id, dec!(0.00001), dec!(50), t0()).unwrap_err();
        assert!(matches!(err, ContractError::BelowDustThreshold { .. }));
        assert_eq!(c.donation_count(), 0);
    }

    #[test]
    fn test_donation_requires_positive_fiat() {
        let (mut c, _, campaign_id) = with_campaign();
        let err = donate(&mut c, campaign_id, dec!(0.01), dec!(0), t0()).unwrap_err();
        assert!(matches!(err, ContractError::InvalidFiatAmount(_)));
    }

    #[test]
    fn test_donation_rejected_after_end() {
        let (mut c, _, campaign_id) = with_campaign();
        c.apply(&ChainOperation::EndCampaign { campaign_id }, t0())
            .unwrap();
        let err = donate(&mut c, campaign_id, dec!(0.01), dec!(50), t0()).unwrap_err();
        assert!(matches!(err, ContractError::CampaignNotActive { .. }));
    }

    #[test]
    fn test_erc20_allow_list() {
        let (mut c, charity_id, campaign_id) = with_campaign();
        let op = ChainOperation::DonateErc20 {
            campaign_id,
            donor: Address::new("0xdonor"),
            token: Address::new("0xunknown"),
            amount: dec!(100),
            min_amount: dec!(1),
            fiat_amount_usd: dec!(100),
        };
        let err = c.apply(&op, t0()).unwrap_err();
        assert!(matches!(err, ContractError::TokenNotAccepted(_)));

        let op = ChainOperation::DonateErc20 {
            campaign_id,
            donor: Address::new("0xdonor"),
            token: Address::new("0xtoken"),
            amount: dec!(100),
            min_amount: dec!(1),
            fiat_amount_usd: dec!(100),
        };
        c.apply(&op, t0()).unwrap();
        assert_eq!(
            c.balance_of(charity_id, &Asset::Erc20(Address::new("0xtoken"))),
            dec!(100)
        );
    }

    #[test]
    fn test_erc20_min_amount() {
        let (mut c, _, campaign_id) = with_campaign();
        let op = ChainOperation::DonateErc20 {
            campaign_id,
            donor: Address::new("0xdonor"),
            token: Address::new("0xtoken"),
            amount: dec!(1),
            min_amount: dec!(5),
            fiat_amount_usd: dec!(1),
        };
        let err = c.apply(&op, t0()).unwrap_err();
        assert!(matches!(err, ContractError::BelowMinAmount { .. }));
    }

    #[test]
    fn test_allocation_event_allowed_after_end() {
        let (mut c, _, campaign_id) = with_campaign();
        c.apply(&ChainOperation::EndCampaign { campaign_id }, t0())
            .unwrap();
        let op = ChainOperation::CreateAllocationEvent {
            campaign_id,
            amount_usd: dec!(25),
            title: "School meals".into(),
            description: String::new(),
        };
        c.apply(&op, t0()).unwrap();
        assert_eq!(c.allocation_event_count(), 1);
    }

    #[test]
    fn test_allocation_event_requires_title() {
        let (mut c, _, campaign_id) = with_campaign();
        let op = ChainOperation::CreateAllocationEvent {
            campaign_id,
            amount_usd: dec!(25),
            title: "  ".into(),
            description: String::new(),
        };
        assert_eq!(c.apply(&op, t0()).unwrap_err(), ContractError::EmptyTitle);
    }

    #[test]
    fn test_withdraw_authorization() {
        let (mut c, charity_id, campaign_id) = with_campaign();
        donate(&mut c, campaign_id, dec!(1), dec!(50), t0()).unwrap();
        let after_lock = t0() + Duration::seconds(7200);

        // Stranger denied
        let err = c
            .apply(
                &ChainOperation::Withdraw {
                    charity_id,
                    asset: Asset::Native,
                    amount: dec!(0.5),
                    caller: Address::new("0xstranger"),
                },
                after_lock,
            )
            .unwrap_err();
        assert!(matches!(err, ContractError::Unauthorized { .. }));

        // Charity wallet permitted
        c.apply(
            &ChainOperation::Withdraw {
                charity_id,
                asset: Asset::Native,
                amount: dec!(0.5),
                caller: Address::new("0xwallet1"),
            },
            after_lock,
        )
        .unwrap();

        // Admin override permitted
        c.apply(
            &ChainOperation::Withdraw {
                charity_id,
                asset: Asset::Native,
                amount: dec!(0.5),
                caller: admin(),
            },
            after_lock,
        )
        .unwrap();

        assert_eq!(c.balance_of(charity_id, &Asset::Native), Decimal::ZERO);
    }

    #[test]
    fn test_withdraw_respects_timelock() {
        let (mut c, charity_id, campaign_id) = with_campaign();
        donate(&mut c, campaign_id, dec!(1), dec!(50), t0()).unwrap();

        let one_second_later = t0() + Duration::seconds(1);
        let err = c
            .apply(
                &ChainOperation::Withdraw {
                    charity_id,
                    asset: Asset::Native,
                    amount: dec!(1),
                    caller: admin(),
                },
                one_second_later,
            )
            .unwrap_err();
        assert!(matches!(err, ContractError::WithdrawalLocked { .. }));
    }

    #[test]
    fn test_withdraw_insufficient_balance() {
        let (mut c, charity_id, campaign_id) = with_campaign();
        donate(&mut c, campaign_id, dec!(1), dec!(50), t0()).unwrap();
        let after_lock = t0() + Duration::seconds(7200);

        let err = c
            .apply(
                &ChainOperation::Withdraw {
                    charity_id,
                    asset: Asset::Native,
                    amount: dec!(2),
                    caller: admin(),
                },
                after_lock,
            )
            .unwrap_err();
        assert!(matches!(err, ContractError::InsufficientBalance { .. }));
        // Balance untouched on revert
        assert_eq!(c.balance_of(charity_id, &Asset::Native), dec!(1));
    }

    #[test]
    fn test_new_donation_rearms_lock() {
        let (mut c, charity_id, campaign_id) = with_campaign();
        donate(&mut c, campaign_id, dec!(1), dec!(50), t0()).unwrap();

        let later = t0() + Duration::seconds(7200);
        donate(&mut c, campaign_id, dec!(1), dec!(50), later).unwrap();

        assert_eq!(
            c.lock_until(charity_id),
            Some(later + Duration::seconds(3600))
        );
    }

    #[test]
    fn test_end_campaign_is_terminal() {
        let (mut c, _, campaign_id) = with_campaign();
        c.apply(&ChainOperation::EndCampaign { campaign_id }, t0())
            .unwrap();
        let err = c
            .apply(&ChainOperation::EndCampaign { campaign_id }, t0())
            .unwrap_err();
        assert!(matches!(err, ContractError::InvalidStatusTransition { .. }));
    }

    #[test]
    fn test_authorize_withdrawal_pure() {
        let wallet = Address::new("0xw");
        let admin = Address::new("0xa");
        assert!(authorize_withdrawal(&wallet, &wallet, &admin));
        assert!(authorize_withdrawal(&wallet, &admin, &admin));
        assert!(!authorize_withdrawal(&wallet, &Address::new("0xz"), &admin));
    }

    mod balance_properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// I1: for any interleaving of accepted donations and
            /// withdrawals, the balance never goes negative and equals the
            /// running sum of accepted operations.
            #[test]
            fn balance_never_negative(ops in proptest::collection::vec((any::<bool>(), 1u64..1000), 1..60)) {
                let (mut c, charity_id, campaign_id) = with_campaign();
                let mut expected = Decimal::ZERO;
                let mut now = t0();

                for (is_donation, raw) in ops {
                    now += Duration::seconds(7200);
                    let amount = Decimal::from(raw) / Decimal::from(100u64);
                    if is_donation {
                        if donate(&mut c, campaign_id, amount, dec!(1), now).is_ok() {
                            expected += amount;
                        }
                    } else {
                        // Jump past the lock so only balance gates the withdrawal
                        now += Duration::seconds(7200);
                        let op = ChainOperation::Withdraw {
                            charity_id,
                            asset: Asset::Native,
                            amount,
                            caller: admin(),
                        };
                        if c.apply(&op, now).is_ok() {
                            expected -= amount;
                        }
                    }

                    let balance = c.balance_of(charity_id, &Asset::Native);
                    prop_assert!(balance >= Decimal::ZERO);
                    prop_assert_eq!(balance, expected);
                }
            }
        }
    }
}
