//! Multi-level commission processing
//!
//! - [`calculator`] - PER_LOT / PERCENT math
//! - [`record`] - commission records and the at-most-once key
//! - [`engine`] - trade-closed → per-level credits

pub mod calculator;
pub mod engine;
pub mod record;

pub use calculator::{CommissionInput, commission_amount};
pub use engine::CommissionEngine;
pub use record::{
    CommissionId, CommissionKey, CommissionRecord, CommissionStatus, Reversal,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{PlanId, TradeId, UserId};
use crate::plan::CommissionType;

/// Trade-closed event from the trade engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub trade_id: TradeId,
    /// Trader
    pub user_id: UserId,
    pub symbol: String,
    /// Lots
    pub quantity: Decimal,
    pub open_price: Decimal,
}

/// One credited level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommissionOutcome {
    pub commission_id: CommissionId,
    pub ib_user_id: UserId,
    pub level: u32,
    pub amount: Decimal,
    pub commission_type: CommissionType,
    pub plan_id: PlanId,
    pub wallet_balance: Decimal,
}

/// Why an ancestor was not paid for this trade
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    BeyondPlanDepth { max_levels: u32 },
    /// Rate missing or not positive
    NoRate,
    NonPositiveAmount,
    /// Idempotency gate: key already recorded
    AlreadyPaid,
    Failed { code: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedLevel {
    pub ib_user_id: UserId,
    pub level: u32,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub(crate) enum LevelOutcome {
    Paid(CommissionOutcome),
    Skipped(SkippedLevel),
}

/// Result of processing one trade
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeCommissionSummary {
    pub trade_id: TradeId,
    /// False only when the trader has no paying chain
    pub processed: bool,
    pub results: Vec<CommissionOutcome>,
    pub skipped: Vec<SkippedLevel>,
}

impl TradeCommissionSummary {
    pub fn unprocessed(trade_id: TradeId) -> Self {
        Self {
            trade_id,
            processed: false,
            results: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn total_paid(&self) -> Decimal {
        self.results
            .iter()
            .fold(Decimal::ZERO, |total, r| total.saturating_add(r.amount))
    }
}
