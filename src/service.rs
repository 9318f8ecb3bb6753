//! IB service
//!
//! Wires the components once, over injected stores, and dispatches
//! [`IbEvent`]s to them. Nothing here holds state of its own; all of it
//! lives behind the store seams so several instances can share one store.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::admin::IbAdmin;
use crate::chain::ChainResolver;
use crate::commission::CommissionEngine;
use crate::config::AppConfig;
use crate::contract_size::ContractSizeTable;
use crate::directory::ReferralDirectory;
use crate::error::IbError;
use crate::events::{EventOutcome, IbEvent};
use crate::ledger::LedgerStore;
use crate::plan::{PlanRegistry, PlanStore};
use crate::registration::ReferralLinker;
use crate::stats::IbStatsService;
use crate::store::MemoryStore;
use crate::tier::TierEngine;
use crate::wallet::{MainWalletGateway, WalletLedger};

/// External collaborators the service is built over
#[derive(Clone)]
pub struct ServiceStores {
    pub directory: Arc<dyn ReferralDirectory>,
    pub plans: Arc<dyn PlanStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub main_wallet: Arc<dyn MainWalletGateway>,
}

impl ServiceStores {
    /// One memory store behind every seam
    pub fn memory(store: Arc<MemoryStore>, main_wallet: Arc<dyn MainWalletGateway>) -> Self {
        Self {
            directory: store.clone(),
            plans: store.clone(),
            ledger: store,
            main_wallet,
        }
    }
}

pub struct IbService {
    plans: Arc<PlanRegistry>,
    wallets: Arc<WalletLedger>,
    engine: CommissionEngine,
    tiers: Arc<TierEngine>,
    admin: IbAdmin,
    linker: ReferralLinker,
    stats: IbStatsService,
}

impl IbService {
    pub fn new(config: &AppConfig, stores: ServiceStores) -> Self {
        let commission = &config.commission;

        let plans = Arc::new(PlanRegistry::new(
            stores.plans.clone(),
            commission.default_plan.to_plan(),
            config.tiers.ladder(),
        ));
        let wallets = Arc::new(WalletLedger::new(stores.ledger.clone()));
        let tiers = Arc::new(TierEngine::new(stores.directory.clone(), plans.clone()));

        let engine = CommissionEngine::new(
            ChainResolver::new(stores.directory.clone()),
            plans.clone(),
            stores.ledger.clone(),
            ContractSizeTable::with_overrides(&commission.contract_sizes),
            commission.max_depth,
            commission.amount_scale,
        );
        let admin = IbAdmin::new(
            stores.directory.clone(),
            plans.clone(),
            stores.ledger.clone(),
            wallets.clone(),
            stores.main_wallet.clone(),
        );
        let linker = ReferralLinker::new(
            stores.directory.clone(),
            tiers.clone(),
            config.tiers.auto_upgrade_on_registration,
        );
        let stats = IbStatsService::new(
            stores.directory.clone(),
            stores.ledger.clone(),
            commission.max_depth,
        );

        Self {
            plans,
            wallets,
            engine,
            tiers,
            admin,
            linker,
            stats,
        }
    }

    pub async fn handle(&self, event: IbEvent) -> Result<EventOutcome, IbError> {
        let kind = event.kind();
        debug!(event = kind, "Handling event");

        let result = match event {
            IbEvent::TradeClosed(trade) => self
                .engine
                .process_trade_commission(&trade)
                .await
                .map(EventOutcome::TradeProcessed),
            IbEvent::UserRegistered {
                user_id,
                referred_by,
            } => self
                .linker
                .register(user_id, referred_by.as_deref())
                .await
                .map(EventOutcome::Registered),
            IbEvent::ApplyForIb {
                user_id,
                referral_code,
            } => self
                .admin
                .apply_for_ib(user_id, referral_code.as_deref())
                .await
                .map(EventOutcome::ProfileUpdated),
            IbEvent::ApproveIb { user_id, plan_id } => self
                .admin
                .approve_ib(user_id, plan_id)
                .await
                .map(EventOutcome::ProfileUpdated),
            IbEvent::BlockIb { user_id, reason } => self
                .admin
                .block_ib(user_id, &reason)
                .await
                .map(EventOutcome::ProfileUpdated),
            IbEvent::ReverseCommission {
                commission_id,
                admin_id,
                reason,
            } => self
                .admin
                .reverse_commission(commission_id, admin_id, &reason)
                .await
                .map(EventOutcome::CommissionReversed),
            IbEvent::WithdrawToMainWallet { ib_user_id, amount } => self
                .admin
                .withdraw_to_main_wallet(ib_user_id, amount)
                .await
                .map(EventOutcome::FundsTransferred),
            IbEvent::CheckTierUpgrade { ib_user_id } => self
                .tiers
                .check_and_upgrade(ib_user_id)
                .await
                .map(|upgrade| EventOutcome::TierChecked { upgrade }),
            IbEvent::SavePlan(plan) => self
                .plans
                .save_plan(plan)
                .await
                .map(EventOutcome::PlanSaved),
        };

        if let Err(e) = &result {
            warn!(
                event = kind,
                code = e.code(),
                retryable = e.is_retryable(),
                error = %e,
                "Event rejected"
            );
        }
        result
    }

    pub fn engine(&self) -> &CommissionEngine {
        &self.engine
    }

    pub fn admin(&self) -> &IbAdmin {
        &self.admin
    }

    pub fn tiers(&self) -> &TierEngine {
        &self.tiers
    }

    pub fn stats(&self) -> &IbStatsService {
        &self.stats
    }

    pub fn wallets(&self) -> &WalletLedger {
        &self.wallets
    }

    pub fn plans(&self) -> &PlanRegistry {
        &self.plans
    }
}
