//! Inbound events and their outcomes
//!
//! Every way into the engine is an [`IbEvent`]: trade-closed notifications
//! from the trade engine, signups from the account service and admin
//! commands. The JSON form is internally tagged on `type`:
//!
//! ```text
//! {"type":"TRADE_CLOSED","trade_id":9001,"user_id":4,"symbol":"EURUSD",
//!  "quantity":"2","open_price":"1.085"}
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::admin::{MainWalletTransfer, ReversalOutcome};
use crate::commission::{ClosedTrade, CommissionId, TradeCommissionSummary};
use crate::core_types::{PlanId, UserId};
use crate::directory::IbProfile;
use crate::plan::CommissionPlan;
use crate::registration::RegistrationOutcome;
use crate::tier::TierUpgrade;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IbEvent {
    TradeClosed(ClosedTrade),
    UserRegistered {
        user_id: UserId,
        #[serde(default)]
        referred_by: Option<String>,
    },
    ApplyForIb {
        user_id: UserId,
        /// Preferred referral code; a random one is drawn when absent
        #[serde(default)]
        referral_code: Option<String>,
    },
    ApproveIb {
        user_id: UserId,
        #[serde(default)]
        plan_id: Option<PlanId>,
    },
    BlockIb {
        user_id: UserId,
        reason: String,
    },
    ReverseCommission {
        commission_id: CommissionId,
        admin_id: UserId,
        reason: String,
    },
    WithdrawToMainWallet {
        ib_user_id: UserId,
        amount: Decimal,
    },
    CheckTierUpgrade {
        ib_user_id: UserId,
    },
    SavePlan(CommissionPlan),
}

impl IbEvent {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            IbEvent::TradeClosed(_) => "TRADE_CLOSED",
            IbEvent::UserRegistered { .. } => "USER_REGISTERED",
            IbEvent::ApplyForIb { .. } => "APPLY_FOR_IB",
            IbEvent::ApproveIb { .. } => "APPROVE_IB",
            IbEvent::BlockIb { .. } => "BLOCK_IB",
            IbEvent::ReverseCommission { .. } => "REVERSE_COMMISSION",
            IbEvent::WithdrawToMainWallet { .. } => "WITHDRAW_TO_MAIN_WALLET",
            IbEvent::CheckTierUpgrade { .. } => "CHECK_TIER_UPGRADE",
            IbEvent::SavePlan(_) => "SAVE_PLAN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventOutcome {
    TradeProcessed(TradeCommissionSummary),
    Registered(RegistrationOutcome),
    ProfileUpdated(IbProfile),
    CommissionReversed(ReversalOutcome),
    FundsTransferred(MainWalletTransfer),
    TierChecked { upgrade: Option<TierUpgrade> },
    PlanSaved(CommissionPlan),
}
