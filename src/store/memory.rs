//! In-memory store
//!
//! DashMap-backed implementation of every store seam. Each wallet sits
//! behind its own `tokio::sync::Mutex`, which is the single-writer lock for
//! that wallet and also guards the commission keys paid into it (a key
//! always names its wallet's owner).

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::commission::record::{CommissionId, CommissionKey, CommissionRecord, Reversal};
use crate::core_types::{PlanId, TierId, UserId};
use crate::directory::{IbActivation, IbProfile, IbStatus, ReferralDirectory};
use crate::error::IbError;
use crate::ledger::{LedgerStore, SettleOutcome};
use crate::plan::{CommissionPlan, PlanStore, Tier};
use crate::wallet::{MainWalletGateway, Wallet, WalletOp};

pub struct MemoryStore {
    users: DashMap<UserId, IbProfile>,
    /// referral code → owner
    referral_codes: DashMap<String, UserId>,
    plans: DashMap<PlanId, CommissionPlan>,
    default_plan_id: Mutex<Option<PlanId>>,
    tiers: RwLock<Vec<Tier>>,
    next_id: AtomicU64,
    wallets: DashMap<UserId, Arc<Mutex<Wallet>>>,
    commissions: DashMap<CommissionId, CommissionRecord>,
    commission_keys: DashMap<CommissionKey, CommissionId>,
    /// Wallets whose writes fail with `StoreUnavailable`
    unavailable: DashSet<UserId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            referral_codes: DashMap::new(),
            plans: DashMap::new(),
            default_plan_id: Mutex::new(None),
            tiers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            wallets: DashMap::new(),
            commissions: DashMap::new(),
            commission_keys: DashMap::new(),
            unavailable: DashSet::new(),
        }
    }

    /// Make ledger writes for `ib_user_id` fail as a transient outage.
    pub fn set_unavailable(&self, ib_user_id: UserId, unavailable: bool) {
        if unavailable {
            self.unavailable.insert(ib_user_id);
        } else {
            self.unavailable.remove(&ib_user_id);
        }
    }

    pub fn plan_count(&self) -> usize {
        self.plans.len()
    }

    pub fn commission_count(&self) -> usize {
        self.commissions.len()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn check_available(&self, ib_user_id: UserId) -> Result<(), IbError> {
        if self.unavailable.contains(&ib_user_id) {
            return Err(IbError::StoreUnavailable(format!(
                "wallet {} unavailable",
                ib_user_id
            )));
        }
        Ok(())
    }

    /// Wallet cell, created zeroed on first use. Never hold the DashMap
    /// guard across an await: clone the Arc out first.
    fn wallet_cell(&self, ib_user_id: UserId) -> Arc<Mutex<Wallet>> {
        self.wallets
            .entry(ib_user_id)
            .or_insert_with(|| Arc::new(Mutex::new(Wallet::new(ib_user_id))))
            .clone()
    }

    fn existing_wallet_cell(&self, ib_user_id: UserId) -> Option<Arc<Mutex<Wallet>>> {
        self.wallets.get(&ib_user_id).map(|cell| cell.clone())
    }

    fn commission(&self, commission_id: CommissionId) -> Option<CommissionRecord> {
        self.commissions.get(&commission_id).map(|r| r.clone())
    }

    /// Reserve `code` for `user_id`; fails if another user owns it.
    fn claim_code(&self, code: &str, user_id: UserId) -> Result<(), IbError> {
        let owner = *self
            .referral_codes
            .entry(code.to_string())
            .or_insert(user_id);
        if owner != user_id {
            return Err(IbError::InvalidState(format!(
                "referral code {} already belongs to user {}",
                code, owner
            )));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReferralDirectory for MemoryStore {
    async fn get_user(&self, user_id: UserId) -> Result<Option<IbProfile>, IbError> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<IbProfile>, IbError> {
        let owner = self.referral_codes.get(code).map(|id| *id);
        Ok(owner.and_then(|id| self.users.get(&id).map(|u| u.clone())))
    }

    async fn save_profile(&self, profile: &IbProfile) -> Result<(), IbError> {
        if let Some(code) = &profile.referral_code {
            self.claim_code(code, profile.user_id)?;
        }

        let previous = self.users.insert(profile.user_id, profile.clone());

        if let Some(old_code) = previous.and_then(|p| p.referral_code)
            && profile.referral_code.as_deref() != Some(old_code.as_str())
        {
            self.referral_codes.remove(&old_code);
        }
        Ok(())
    }

    async fn create_user_if_absent(&self, profile: &IbProfile) -> Result<IbProfile, IbError> {
        match self.users.entry(profile.user_id) {
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                if let Some(code) = &profile.referral_code {
                    self.claim_code(code, profile.user_id)?;
                }
                Ok(slot.insert(profile.clone()).value().clone())
            }
        }
    }

    async fn link_parent(
        &self,
        user_id: UserId,
        parent_ib_id: UserId,
        referred_by: &str,
    ) -> Result<Option<IbProfile>, IbError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| IbError::not_found("user", user_id))?;

        if user.parent_ib_id.is_some() {
            return Ok(None);
        }
        user.parent_ib_id = Some(parent_ib_id);
        user.referred_by = Some(referred_by.to_string());
        Ok(Some(user.clone()))
    }

    async fn open_application(
        &self,
        user_id: UserId,
        referral_code: &str,
    ) -> Result<Option<IbProfile>, IbError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| IbError::not_found("user", user_id))?;

        if user.is_ib || user.ib_status == Some(IbStatus::Pending) {
            return Ok(None);
        }
        if user.referral_code.is_none() {
            self.claim_code(referral_code, user_id)?;
            user.referral_code = Some(referral_code.to_string());
        }
        user.ib_status = Some(IbStatus::Pending);
        user.blocked_reason = None;
        Ok(Some(user.clone()))
    }

    async fn activate_ib(
        &self,
        user_id: UserId,
        activation: &IbActivation,
    ) -> Result<Option<IbProfile>, IbError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| IbError::not_found("user", user_id))?;

        if user.ib_status != Some(IbStatus::Pending) {
            return Ok(None);
        }
        if user.referral_code.is_none() {
            self.claim_code(&activation.referral_code, user_id)?;
            user.referral_code = Some(activation.referral_code.clone());
        }
        user.is_ib = true;
        user.ib_status = Some(IbStatus::Active);
        user.ib_plan_id = Some(activation.plan_id);
        user.blocked_reason = None;
        if activation.tier_order > user.tier_order() {
            user.ib_level_id = Some(activation.tier_id);
            user.ib_level_order = Some(activation.tier_order);
        }
        Ok(Some(user.clone()))
    }

    async fn transition_ib_status(
        &self,
        user_id: UserId,
        from: &[IbStatus],
        to: IbStatus,
        reason: Option<&str>,
    ) -> Result<Option<IbProfile>, IbError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| IbError::not_found("user", user_id))?;

        if !user.ib_status.is_some_and(|status| from.contains(&status)) {
            return Ok(None);
        }
        user.ib_status = Some(to);
        user.blocked_reason = reason.map(str::to_string);
        Ok(Some(user.clone()))
    }

    async fn direct_referrals(&self, ib_user_id: UserId) -> Result<Vec<UserId>, IbError> {
        let mut ids: Vec<UserId> = self
            .users
            .iter()
            .filter(|u| u.parent_ib_id == Some(ib_user_id))
            .map(|u| u.user_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn promote_tier(
        &self,
        user_id: UserId,
        tier_id: TierId,
        order: u32,
    ) -> Result<bool, IbError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| IbError::not_found("user", user_id))?;

        if order <= user.tier_order() {
            return Ok(false);
        }
        user.ib_level_id = Some(tier_id);
        user.ib_level_order = Some(order);
        Ok(true)
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn get_plan(&self, plan_id: PlanId) -> Result<Option<CommissionPlan>, IbError> {
        Ok(self.plans.get(&plan_id).map(|p| p.clone()))
    }

    async fn get_default_plan(&self) -> Result<Option<CommissionPlan>, IbError> {
        let default_id = *self.default_plan_id.lock().await;
        Ok(default_id.and_then(|id| self.plans.get(&id).map(|p| p.clone())))
    }

    async fn save_plan(&self, mut plan: CommissionPlan) -> Result<CommissionPlan, IbError> {
        let mut default_id = self.default_plan_id.lock().await;

        if plan.plan_id == 0 {
            plan.plan_id = self.next_id();
        }

        if plan.is_default {
            if let Some(old) = *default_id
                && old != plan.plan_id
                && let Some(mut previous) = self.plans.get_mut(&old)
            {
                previous.is_default = false;
            }
            *default_id = Some(plan.plan_id);
        } else if *default_id == Some(plan.plan_id) {
            return Err(IbError::InvalidState(
                "the default plan cannot be demoted; mark another plan default".to_string(),
            ));
        }

        self.plans.insert(plan.plan_id, plan.clone());
        Ok(plan)
    }

    async fn ensure_default_plan(
        &self,
        mut plan: CommissionPlan,
    ) -> Result<CommissionPlan, IbError> {
        let mut default_id = self.default_plan_id.lock().await;

        let existing = (*default_id).and_then(|id| self.plans.get(&id).map(|p| p.clone()));
        if let Some(existing) = existing {
            return Ok(existing);
        }

        plan.plan_id = self.next_id();
        plan.is_default = true;
        self.plans.insert(plan.plan_id, plan.clone());
        *default_id = Some(plan.plan_id);
        Ok(plan)
    }

    async fn list_tiers(&self) -> Result<Vec<Tier>, IbError> {
        Ok(self.tiers.read().await.clone())
    }

    async fn insert_tiers_if_empty(&self, ladder: Vec<Tier>) -> Result<Vec<Tier>, IbError> {
        let mut tiers = self.tiers.write().await;
        if tiers.is_empty() {
            let mut ladder = ladder;
            ladder.sort_by_key(|t| t.order);
            for tier in ladder.iter_mut() {
                tier.tier_id = self.next_id();
            }
            *tiers = ladder;
        }
        Ok(tiers.clone())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_wallet(&self, ib_user_id: UserId) -> Result<Option<Wallet>, IbError> {
        let Some(cell) = self.existing_wallet_cell(ib_user_id) else {
            return Ok(None);
        };
        let wallet = cell.lock().await.clone();
        Ok(Some(wallet))
    }

    async fn get_or_create_wallet(&self, ib_user_id: UserId) -> Result<Wallet, IbError> {
        let cell = self.wallet_cell(ib_user_id);
        let wallet = cell.lock().await.clone();
        Ok(wallet)
    }

    async fn apply_wallet_op(&self, ib_user_id: UserId, op: WalletOp) -> Result<Wallet, IbError> {
        self.check_available(ib_user_id)?;

        let cell = self.wallet_cell(ib_user_id);
        let mut wallet = cell.lock().await;

        let mut next = wallet.clone();
        next.apply(op)?;
        *wallet = next.clone();
        Ok(next)
    }

    async fn record_and_credit(
        &self,
        record: CommissionRecord,
    ) -> Result<SettleOutcome, IbError> {
        self.check_available(record.ib_user_id)?;

        let cell = self.wallet_cell(record.ib_user_id);
        let mut wallet = cell.lock().await;

        let key = record.key();
        let existing_id = self.commission_keys.get(&key).map(|id| *id);
        if let Some(existing_id) = existing_id {
            let existing = self
                .commission(existing_id)
                .ok_or_else(|| IbError::not_found("commission", existing_id))?;
            debug!(commission_id = %existing_id, "Commission key already recorded");
            return Ok(SettleOutcome::AlreadyRecorded(existing));
        }

        let mut next = wallet.clone();
        next.apply(WalletOp::Credit(record.commission_amount))?;

        self.commissions
            .insert(record.commission_id, record.clone());
        self.commission_keys.insert(key, record.commission_id);
        *wallet = next.clone();

        Ok(SettleOutcome::Credited {
            record,
            wallet: next,
        })
    }

    async fn get_commission(
        &self,
        commission_id: CommissionId,
    ) -> Result<Option<CommissionRecord>, IbError> {
        Ok(self.commission(commission_id))
    }

    async fn find_commission(
        &self,
        key: &CommissionKey,
    ) -> Result<Option<CommissionRecord>, IbError> {
        let id = self.commission_keys.get(key).map(|id| *id);
        Ok(id.and_then(|id| self.commission(id)))
    }

    async fn list_commissions_for_ib(
        &self,
        ib_user_id: UserId,
    ) -> Result<Vec<CommissionRecord>, IbError> {
        let mut records: Vec<CommissionRecord> = self
            .commissions
            .iter()
            .filter(|r| r.ib_user_id == ib_user_id)
            .map(|r| r.clone())
            .collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.commission_id.cmp(&a.commission_id))
        });
        Ok(records)
    }

    async fn reverse_commission(
        &self,
        commission_id: CommissionId,
        reversal: Reversal,
    ) -> Result<(CommissionRecord, Wallet), IbError> {
        let ib_user_id = self
            .commission(commission_id)
            .ok_or_else(|| IbError::not_found("commission", commission_id))?
            .ib_user_id;
        self.check_available(ib_user_id)?;

        let cell = self.wallet_cell(ib_user_id);
        let mut wallet = cell.lock().await;

        // re-read under the wallet lock
        let mut record = self
            .commission(commission_id)
            .ok_or_else(|| IbError::not_found("commission", commission_id))?;
        record.mark_reversed(&reversal)?;

        let mut next = wallet.clone();
        next.apply(WalletOp::Reverse(record.commission_amount))?;

        self.commissions.insert(commission_id, record.clone());
        *wallet = next.clone();
        Ok((record, next))
    }
}

/// Main wallet kept in memory; repeated references are ignored.
pub struct InMemoryMainWallet {
    balances: DashMap<UserId, Decimal>,
    applied: DashSet<String>,
}

impl InMemoryMainWallet {
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
            applied: DashSet::new(),
        }
    }

    pub fn balance(&self, user_id: UserId) -> Decimal {
        self.balances
            .get(&user_id)
            .map(|b| *b)
            .unwrap_or(Decimal::ZERO)
    }
}

impl Default for InMemoryMainWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MainWalletGateway for InMemoryMainWallet {
    fn name(&self) -> &'static str {
        "memory-main-wallet"
    }

    async fn credit(
        &self,
        user_id: UserId,
        amount: Decimal,
        reference: &str,
    ) -> Result<(), IbError> {
        if !self.applied.insert(reference.to_string()) {
            debug!(user_id, reference, "Main wallet credit already applied");
            return Ok(());
        }
        *self.balances.entry(user_id).or_insert(Decimal::ZERO) += amount;
        Ok(())
    }
}
