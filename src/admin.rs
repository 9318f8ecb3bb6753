//! Admin commands
//!
//! IB lifecycle (apply → approve → block), commission reversal and moving
//! IB wallet funds to the main wallet. Every command either completes fully
//! or fails without leaving a partial mutation behind.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::commission::{CommissionId, CommissionRecord, Reversal};
use crate::core_types::{PlanId, UserId};
use crate::directory::{
    IbActivation, IbProfile, IbStatus, ReferralDirectory, generate_referral_code,
};
use crate::error::IbError;
use crate::ledger::LedgerStore;
use crate::plan::PlanRegistry;
use crate::wallet::{MainWalletGateway, Wallet, WalletLedger};

/// Attempts at drawing an unused referral code
const REFERRAL_CODE_ATTEMPTS: usize = 8;

/// Bounds for a requested referral code
const MIN_CODE_LEN: usize = 4;
const MAX_CODE_LEN: usize = 16;

fn changed_concurrently(user_id: UserId) -> IbError {
    IbError::InvalidState(format!("user {} IB status changed concurrently", user_id))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReversalOutcome {
    pub record: CommissionRecord,
    pub wallet: Wallet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MainWalletTransfer {
    pub ib_user_id: UserId,
    pub amount: Decimal,
    pub reference: String,
    pub wallet: Wallet,
}

pub struct IbAdmin {
    directory: Arc<dyn ReferralDirectory>,
    plans: Arc<PlanRegistry>,
    ledger: Arc<dyn LedgerStore>,
    wallets: Arc<WalletLedger>,
    main_wallet: Arc<dyn MainWalletGateway>,
}

impl IbAdmin {
    pub fn new(
        directory: Arc<dyn ReferralDirectory>,
        plans: Arc<PlanRegistry>,
        ledger: Arc<dyn LedgerStore>,
        wallets: Arc<WalletLedger>,
        main_wallet: Arc<dyn MainWalletGateway>,
    ) -> Self {
        Self {
            directory,
            plans,
            ledger,
            wallets,
            main_wallet,
        }
    }

    /// User asks to become an IB. Keeps an existing referral code, else
    /// takes `requested_code` if free, else draws a random one.
    pub async fn apply_for_ib(
        &self,
        user_id: UserId,
        requested_code: Option<&str>,
    ) -> Result<IbProfile, IbError> {
        let user = self.directory.require_user(user_id).await?;

        if user.is_ib {
            return Err(IbError::InvalidState(format!(
                "user {} is already an IB",
                user_id
            )));
        }
        if user.ib_status == Some(IbStatus::Pending) {
            return Err(IbError::InvalidState(format!(
                "user {} already has a pending IB application",
                user_id
            )));
        }

        let code = match (user.referral_code, requested_code) {
            (Some(existing), _) => existing,
            (None, Some(code)) => self.claim_referral_code(user_id, code).await?,
            (None, None) => self.unused_referral_code().await?,
        };
        let user = self
            .directory
            .open_application(user_id, &code)
            .await?
            .ok_or_else(|| changed_concurrently(user_id))?;

        info!(user_id, code = ?user.referral_code, "IB application received");
        Ok(user)
    }

    /// Activate a pending applicant on `plan_id` (or the default plan).
    pub async fn approve_ib(
        &self,
        user_id: UserId,
        plan_id: Option<PlanId>,
    ) -> Result<IbProfile, IbError> {
        let user = self.directory.require_user(user_id).await?;
        if user.ib_status != Some(IbStatus::Pending) {
            return Err(IbError::InvalidState(format!(
                "user {} is not a pending IB applicant (status {:?})",
                user_id, user.ib_status
            )));
        }

        let plan = match plan_id {
            Some(id) => self.plans.get_plan(id).await?,
            None => self.plans.default_plan().await?,
        };
        let entry_tier = self.plans.entry_tier().await?;

        let referral_code = match user.referral_code {
            Some(code) => code,
            None => self.unused_referral_code().await?,
        };
        let activation = IbActivation {
            plan_id: plan.plan_id,
            tier_id: entry_tier.tier_id,
            tier_order: entry_tier.order,
            referral_code,
        };

        self.wallets.get_or_create_wallet(user_id).await?;
        let user = self
            .directory
            .activate_ib(user_id, &activation)
            .await?
            .ok_or_else(|| changed_concurrently(user_id))?;

        info!(
            user_id,
            plan_id = plan.plan_id,
            tier = %entry_tier.name,
            "IB approved"
        );
        Ok(user)
    }

    /// Block an IB or applicant. Blocked IBs end every chain walk.
    pub async fn block_ib(&self, user_id: UserId, reason: &str) -> Result<IbProfile, IbError> {
        let user = self.directory.require_user(user_id).await?;
        match user.ib_status {
            Some(IbStatus::Active) | Some(IbStatus::Pending) => {}
            Some(IbStatus::Blocked) => {
                return Err(IbError::InvalidState(format!(
                    "user {} is already blocked",
                    user_id
                )));
            }
            None => {
                return Err(IbError::InvalidState(format!(
                    "user {} is not an IB",
                    user_id
                )));
            }
        }

        let user = self
            .directory
            .transition_ib_status(
                user_id,
                &[IbStatus::Active, IbStatus::Pending],
                IbStatus::Blocked,
                Some(reason),
            )
            .await?
            .ok_or_else(|| changed_concurrently(user_id))?;

        warn!(user_id, reason, "IB blocked");
        Ok(user)
    }

    /// CREDITED → REVERSED, debiting the IB wallet in the same unit.
    pub async fn reverse_commission(
        &self,
        commission_id: CommissionId,
        admin_id: UserId,
        reason: &str,
    ) -> Result<ReversalOutcome, IbError> {
        let reversal = Reversal {
            reversed_by: admin_id,
            reason: reason.to_string(),
            reversed_at: Utc::now(),
        };
        let (record, wallet) = self
            .ledger
            .reverse_commission(commission_id, reversal)
            .await?;

        info!(
            commission_id = %commission_id,
            ib_user_id = record.ib_user_id,
            amount = %record.commission_amount,
            admin_id,
            balance = %wallet.balance,
            "Commission reversed"
        );
        if !wallet.reconciliation_debt.is_zero() {
            warn!(
                ib_user_id = record.ib_user_id,
                debt = %wallet.reconciliation_debt,
                "Reversal exceeded wallet funds, reconciliation debt recorded"
            );
        }
        Ok(ReversalOutcome { record, wallet })
    }

    /// Move `amount` from the IB wallet to the user's main wallet.
    ///
    /// request → main wallet credit → complete; a failed credit cancels the
    /// request so the balance is restored before the error is returned.
    pub async fn withdraw_to_main_wallet(
        &self,
        ib_user_id: UserId,
        amount: Decimal,
    ) -> Result<MainWalletTransfer, IbError> {
        let user = self.directory.require_user(ib_user_id).await?;
        if !user.is_ib {
            return Err(IbError::InvalidState(format!(
                "user {} is not an IB",
                ib_user_id
            )));
        }

        self.wallets.request_withdrawal(ib_user_id, amount).await?;
        let reference = format!("IBW-{}", ulid::Ulid::new());

        if let Err(e) = self
            .main_wallet
            .credit(ib_user_id, amount, &reference)
            .await
        {
            warn!(
                ib_user_id,
                reference = %reference,
                gateway = self.main_wallet.name(),
                error = %e,
                "Main wallet credit failed, cancelling withdrawal"
            );
            if let Err(cancel_err) = self.wallets.cancel_withdrawal(ib_user_id, amount).await {
                error!(
                    ib_user_id,
                    reference = %reference,
                    amount = %amount,
                    error = %cancel_err,
                    "Withdrawal cancel failed, amount stuck in pending"
                );
            }
            return Err(e);
        }

        let wallet = match self.wallets.complete_withdrawal(ib_user_id, amount).await {
            Ok(wallet) => wallet,
            Err(e) => {
                // main wallet already holds the funds; reconcile by reference
                error!(
                    ib_user_id,
                    reference = %reference,
                    amount = %amount,
                    error = %e,
                    "Main wallet credited but withdrawal not completed"
                );
                return Err(e);
            }
        };

        info!(
            ib_user_id,
            amount = %amount,
            reference = %reference,
            "IB funds moved to main wallet"
        );
        Ok(MainWalletTransfer {
            ib_user_id,
            amount,
            reference,
            wallet,
        })
    }

    async fn claim_referral_code(&self, user_id: UserId, code: &str) -> Result<String, IbError> {
        let code = code.trim().to_ascii_uppercase();
        if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len())
            || !code.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(IbError::InvalidState(format!(
                "referral code must be {}-{} letters or digits",
                MIN_CODE_LEN, MAX_CODE_LEN
            )));
        }
        match self.directory.find_by_referral_code(&code).await? {
            Some(owner) if owner.user_id != user_id => Err(IbError::InvalidState(format!(
                "referral code {} is taken",
                code
            ))),
            _ => Ok(code),
        }
    }

    async fn unused_referral_code(&self) -> Result<String, IbError> {
        for _ in 0..REFERRAL_CODE_ATTEMPTS {
            let code = generate_referral_code();
            if self.directory.find_by_referral_code(&code).await?.is_none() {
                return Ok(code);
            }
        }
        Err(IbError::InvalidState(
            "could not allocate a unique referral code".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commission::CommissionStatus;
    use crate::plan::{CommissionPlan, CommissionType, default_tier_ladder};
    use crate::core_types::TierId;
    use crate::store::MemoryStore;
    use crate::tier::TierEngine;
    use crate::wallet::gateway::MockMainWallet;
    use async_trait::async_trait;
    use std::time::Duration;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    /// Directory whose status writes land `delay` after they are issued
    struct DelayedWrites {
        inner: Arc<MemoryStore>,
        delay: Duration,
    }

    #[async_trait]
    impl ReferralDirectory for DelayedWrites {
        async fn get_user(&self, user_id: UserId) -> Result<Option<IbProfile>, IbError> {
            self.inner.get_user(user_id).await
        }

        async fn find_by_referral_code(&self, code: &str) -> Result<Option<IbProfile>, IbError> {
            self.inner.find_by_referral_code(code).await
        }

        async fn save_profile(&self, profile: &IbProfile) -> Result<(), IbError> {
            self.inner.save_profile(profile).await
        }

        async fn create_user_if_absent(&self, profile: &IbProfile) -> Result<IbProfile, IbError> {
            self.inner.create_user_if_absent(profile).await
        }

        async fn link_parent(
            &self,
            user_id: UserId,
            parent_ib_id: UserId,
            referred_by: &str,
        ) -> Result<Option<IbProfile>, IbError> {
            self.inner.link_parent(user_id, parent_ib_id, referred_by).await
        }

        async fn open_application(
            &self,
            user_id: UserId,
            referral_code: &str,
        ) -> Result<Option<IbProfile>, IbError> {
            self.inner.open_application(user_id, referral_code).await
        }

        async fn activate_ib(
            &self,
            user_id: UserId,
            activation: &IbActivation,
        ) -> Result<Option<IbProfile>, IbError> {
            tokio::time::sleep(self.delay).await;
            self.inner.activate_ib(user_id, activation).await
        }

        async fn transition_ib_status(
            &self,
            user_id: UserId,
            from: &[IbStatus],
            to: IbStatus,
            reason: Option<&str>,
        ) -> Result<Option<IbProfile>, IbError> {
            tokio::time::sleep(self.delay).await;
            self.inner.transition_ib_status(user_id, from, to, reason).await
        }

        async fn direct_referrals(&self, ib_user_id: UserId) -> Result<Vec<UserId>, IbError> {
            self.inner.direct_referrals(ib_user_id).await
        }

        async fn promote_tier(
            &self,
            user_id: UserId,
            tier_id: TierId,
            order: u32,
        ) -> Result<bool, IbError> {
            self.inner.promote_tier(user_id, tier_id, order).await
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        main: Arc<MockMainWallet>,
        admin: IbAdmin,
        plans: Arc<PlanRegistry>,
        wallets: Arc<WalletLedger>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_write_delay(Duration::ZERO)
        }

        fn with_write_delay(delay: Duration) -> Self {
            let store = Arc::new(MemoryStore::new());
            let main = Arc::new(MockMainWallet::new());
            let plans = Arc::new(PlanRegistry::new(
                store.clone(),
                CommissionPlan::from_rates(
                    "Standard",
                    CommissionType::PerLot,
                    &[d(5), d(3), d(1)],
                ),
                default_tier_ladder(),
            ));
            let wallets = Arc::new(WalletLedger::new(store.clone()));
            let directory = Arc::new(DelayedWrites {
                inner: store.clone(),
                delay,
            });
            let admin = IbAdmin::new(
                directory,
                plans.clone(),
                store.clone(),
                wallets.clone(),
                main.clone(),
            );
            Self {
                store,
                main,
                admin,
                plans,
                wallets,
            }
        }

        async fn user(&self, id: UserId) {
            self.store.save_profile(&IbProfile::new(id)).await.unwrap();
        }

        async fn active_ib(&self, id: UserId) {
            self.user(id).await;
            self.admin.apply_for_ib(id, None).await.unwrap();
            self.admin.approve_ib(id, None).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_apply_then_approve() {
        let h = Harness::new();
        h.user(1).await;

        let applied = h.admin.apply_for_ib(1, None).await.unwrap();
        assert_eq!(applied.ib_status, Some(IbStatus::Pending));
        assert!(!applied.is_ib);
        let code = applied.referral_code.clone().unwrap();

        let approved = h.admin.approve_ib(1, None).await.unwrap();
        assert!(approved.is_active_ib());
        assert_eq!(approved.referral_code.as_deref(), Some(code.as_str()));
        assert_eq!(approved.ib_level_order, Some(1));
        assert!(approved.ib_plan_id.is_some());
        assert!(h.store.get_wallet(1).await.unwrap().is_some());

        let by_code = h.store.find_by_referral_code(&code).await.unwrap().unwrap();
        assert_eq!(by_code.user_id, 1);
    }

    #[tokio::test]
    async fn test_apply_with_requested_code() {
        let h = Harness::new();
        h.user(1).await;
        h.user(2).await;

        let applied = h.admin.apply_for_ib(1, Some(" vip42 ")).await.unwrap();
        assert_eq!(applied.referral_code.as_deref(), Some("VIP42"));

        let err = h.admin.apply_for_ib(2, Some("vip42")).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        let err = h.admin.apply_for_ib(2, Some("no!")).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        // rejected application left no trace
        let user = h.store.get_user(2).await.unwrap().unwrap();
        assert!(user.ib_status.is_none());
    }

    #[tokio::test]
    async fn test_apply_rejects_existing_ib_and_pending() {
        let h = Harness::new();
        h.user(1).await;
        h.admin.apply_for_ib(1, None).await.unwrap();
        assert_eq!(
            h.admin.apply_for_ib(1, None).await.unwrap_err().code(),
            "INVALID_STATE"
        );

        h.admin.approve_ib(1, None).await.unwrap();
        assert_eq!(
            h.admin.apply_for_ib(1, None).await.unwrap_err().code(),
            "INVALID_STATE"
        );

        assert_eq!(
            h.admin.apply_for_ib(404, None).await.unwrap_err().code(),
            "NOT_FOUND"
        );
    }

    #[tokio::test]
    async fn test_approve_requires_pending_and_known_plan() {
        let h = Harness::new();
        h.user(1).await;
        assert_eq!(
            h.admin.approve_ib(1, None).await.unwrap_err().code(),
            "INVALID_STATE"
        );

        h.admin.apply_for_ib(1, None).await.unwrap();
        assert_eq!(
            h.admin.approve_ib(1, Some(9999)).await.unwrap_err().code(),
            "NOT_FOUND"
        );
        // failed approval left the application pending
        let user = h.store.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.ib_status, Some(IbStatus::Pending));
    }

    #[tokio::test]
    async fn test_block() {
        let h = Harness::new();
        h.active_ib(1).await;

        let blocked = h.admin.block_ib(1, "fraud").await.unwrap();
        assert_eq!(blocked.ib_status, Some(IbStatus::Blocked));
        assert_eq!(blocked.blocked_reason.as_deref(), Some("fraud"));
        assert!(!blocked.is_active_ib());

        assert_eq!(
            h.admin.block_ib(1, "again").await.unwrap_err().code(),
            "INVALID_STATE"
        );

        h.user(2).await;
        assert_eq!(
            h.admin.block_ib(2, "not ib").await.unwrap_err().code(),
            "INVALID_STATE"
        );
    }

    #[tokio::test]
    async fn test_block_keeps_concurrent_tier_upgrade() {
        let h = Harness::with_write_delay(Duration::from_millis(50));
        h.active_ib(1).await;
        for id in 10..15 {
            let mut referral = IbProfile::new(id);
            referral.parent_ib_id = Some(1);
            h.store.save_profile(&referral).await.unwrap();
        }
        let tiers = TierEngine::new(h.store.clone(), h.plans.clone());

        let (blocked, upgrade) = tokio::join!(h.admin.block_ib(1, "fraud"), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tiers.check_and_upgrade(1).await
        });

        assert!(blocked.is_ok());
        assert!(upgrade.unwrap().unwrap().upgraded);
        let user = h.store.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.ib_status, Some(IbStatus::Blocked));
        assert_eq!(user.ib_level_order, Some(2));
    }

    #[tokio::test]
    async fn test_approve_does_not_reactivate_blocked_applicant() {
        let h = Harness::with_write_delay(Duration::from_millis(50));
        h.user(1).await;
        h.admin.apply_for_ib(1, None).await.unwrap();

        let (approved, _) = tokio::join!(h.admin.approve_ib(1, None), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            h.store
                .transition_ib_status(
                    1,
                    &[IbStatus::Active, IbStatus::Pending],
                    IbStatus::Blocked,
                    Some("fraud"),
                )
                .await
                .unwrap()
        });

        assert_eq!(approved.unwrap_err().code(), "INVALID_STATE");
        let user = h.store.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.ib_status, Some(IbStatus::Blocked));
        assert!(!user.is_ib);
    }

    #[tokio::test]
    async fn test_withdraw_to_main_wallet() {
        let h = Harness::new();
        h.active_ib(1).await;
        h.wallets.credit_commission(1, d(50)).await.unwrap();

        let transfer = h.admin.withdraw_to_main_wallet(1, d(20)).await.unwrap();
        assert_eq!(transfer.wallet.balance, d(30));
        assert_eq!(transfer.wallet.total_withdrawn, d(20));
        assert_eq!(transfer.wallet.pending_withdrawal, Decimal::ZERO);
        assert!(transfer.wallet.is_balanced());

        let credits = h.main.credits();
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].0, 1);
        assert_eq!(credits[0].1, d(20));
        assert_eq!(credits[0].2, transfer.reference);
    }

    #[tokio::test]
    async fn test_withdraw_to_main_wallet_insufficient() {
        let h = Harness::new();
        h.active_ib(1).await;
        h.wallets.credit_commission(1, d(5)).await.unwrap();

        let err = h.admin.withdraw_to_main_wallet(1, d(6)).await.unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
        assert!(h.main.credits().is_empty());

        let w = h.store.get_wallet(1).await.unwrap().unwrap();
        assert_eq!(w.balance, d(5));
        assert_eq!(w.pending_withdrawal, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_withdraw_gateway_failure_restores_balance() {
        let h = Harness::new();
        h.active_ib(1).await;
        h.wallets.credit_commission(1, d(50)).await.unwrap();
        h.main.set_fail(true);

        let err = h.admin.withdraw_to_main_wallet(1, d(20)).await.unwrap_err();
        assert!(err.is_retryable());

        let w = h.store.get_wallet(1).await.unwrap().unwrap();
        assert_eq!(w.balance, d(50));
        assert_eq!(w.pending_withdrawal, Decimal::ZERO);
        assert_eq!(w.total_withdrawn, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_reverse_commission_via_admin() {
        let h = Harness::new();
        h.active_ib(1).await;

        let record = CommissionRecord {
            commission_id: CommissionId::new(),
            trade_id: 77,
            trader_user_id: 100,
            ib_user_id: 1,
            level: 1,
            base_amount: d(2),
            commission_amount: d(10),
            symbol: "EURUSD".to_string(),
            trade_lot_size: d(2),
            contract_size: d(100_000),
            open_price: Decimal::ONE,
            rate: d(5),
            commission_type: CommissionType::PerLot,
            status: CommissionStatus::Credited,
            created_at: Utc::now(),
            reversed_at: None,
            reversed_by: None,
            reversal_reason: None,
        };
        let id = record.commission_id;
        h.store.record_and_credit(record).await.unwrap();

        let outcome = h.admin.reverse_commission(id, 9, "duplicate fill").await.unwrap();
        assert_eq!(outcome.record.status, CommissionStatus::Reversed);
        assert_eq!(outcome.record.reversed_by, Some(9));
        assert_eq!(outcome.wallet.balance, Decimal::ZERO);

        let err = h.admin.reverse_commission(id, 9, "again").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");

        let err = h
            .admin
            .reverse_commission(CommissionId::new(), 9, "missing")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
