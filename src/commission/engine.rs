//! Commission Calculator
//!
//! Turns one closed trade into per-level commission credits:
//!
//! ```text
//! TradeClosed ──▶ ChainResolver ──▶ [(ib, level)] ──▶ per level:
//!     plan → depth check → rate → contract size → amount
//!         → idempotency gate + wallet credit (one store unit)
//! ```
//!
//! Levels are settled concurrently and independently. A failure on one
//! ancestor is logged and reported as skipped; it never blocks the others.

use chrono::Utc;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::calculator::{CommissionInput, commission_amount};
use super::record::{CommissionId, CommissionRecord, CommissionStatus};
use super::{
    ClosedTrade, CommissionOutcome, LevelOutcome, SkipReason, SkippedLevel,
    TradeCommissionSummary,
};
use crate::chain::{ChainLink, ChainResolver};
use crate::contract_size::ContractSizeTable;
use crate::error::IbError;
use crate::ledger::{LedgerStore, SettleOutcome};
use crate::plan::PlanRegistry;

pub struct CommissionEngine {
    resolver: ChainResolver,
    plans: Arc<PlanRegistry>,
    ledger: Arc<dyn LedgerStore>,
    contract_sizes: ContractSizeTable,
    max_depth: u32,
    amount_scale: u32,
}

impl CommissionEngine {
    pub fn new(
        resolver: ChainResolver,
        plans: Arc<PlanRegistry>,
        ledger: Arc<dyn LedgerStore>,
        contract_sizes: ContractSizeTable,
        max_depth: u32,
        amount_scale: u32,
    ) -> Self {
        Self {
            resolver,
            plans,
            ledger,
            contract_sizes,
            max_depth,
            amount_scale,
        }
    }

    /// Pay every eligible ancestor of the trader for `trade`.
    ///
    /// Safe to call again with the same trade: already-paid levels come back
    /// as `SkipReason::AlreadyPaid`. Only a chain-level failure (unknown
    /// trader, cyclic links, store down while walking) is an `Err`.
    pub async fn process_trade_commission(
        &self,
        trade: &ClosedTrade,
    ) -> Result<TradeCommissionSummary, IbError> {
        let chain = self.resolver.resolve(trade.user_id, self.max_depth).await?;

        if chain.is_empty() {
            debug!(
                trade_id = trade.trade_id,
                trader_id = trade.user_id,
                "No IB chain for trader"
            );
            return Ok(TradeCommissionSummary::unprocessed(trade.trade_id));
        }

        let outcomes = join_all(chain.iter().map(|link| self.settle_level(trade, link))).await;

        let mut summary = TradeCommissionSummary {
            trade_id: trade.trade_id,
            processed: true,
            results: Vec::new(),
            skipped: Vec::new(),
        };
        for outcome in outcomes {
            match outcome {
                LevelOutcome::Paid(paid) => summary.results.push(paid),
                LevelOutcome::Skipped(skipped) => summary.skipped.push(skipped),
            }
        }

        info!(
            trade_id = trade.trade_id,
            chain_len = chain.len(),
            paid = summary.results.len(),
            total = %summary.total_paid(),
            "Trade commission processed"
        );
        Ok(summary)
    }

    async fn settle_level(&self, trade: &ClosedTrade, link: &ChainLink) -> LevelOutcome {
        match self.try_settle_level(trade, link).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    trade_id = trade.trade_id,
                    ib_user_id = link.ib.user_id,
                    level = link.level,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Commission level failed, continuing with chain"
                );
                LevelOutcome::skipped(link, SkipReason::Failed {
                    code: e.code(),
                    message: e.to_string(),
                })
            }
        }
    }

    async fn try_settle_level(
        &self,
        trade: &ClosedTrade,
        link: &ChainLink,
    ) -> Result<LevelOutcome, IbError> {
        let plan = self.plans.plan_for(&link.ib).await?;

        if link.level > plan.max_levels {
            return Ok(LevelOutcome::skipped(link, SkipReason::BeyondPlanDepth {
                max_levels: plan.max_levels,
            }));
        }

        let rate = match plan.rate_for(link.level) {
            Some(rate) if rate > Decimal::ZERO => rate,
            _ => return Ok(LevelOutcome::skipped(link, SkipReason::NoRate)),
        };

        let contract_size = self.contract_sizes.contract_size(&trade.symbol);
        let amount = commission_amount(
            &CommissionInput {
                commission_type: plan.commission_type,
                rate,
                lots: trade.quantity,
                contract_size,
                open_price: trade.open_price,
            },
            self.amount_scale,
        )?;
        if amount <= Decimal::ZERO {
            return Ok(LevelOutcome::skipped(link, SkipReason::NonPositiveAmount));
        }

        let record = CommissionRecord {
            commission_id: CommissionId::new(),
            trade_id: trade.trade_id,
            trader_user_id: trade.user_id,
            ib_user_id: link.ib.user_id,
            level: link.level,
            base_amount: trade.quantity,
            commission_amount: amount,
            symbol: trade.symbol.clone(),
            trade_lot_size: trade.quantity,
            contract_size,
            open_price: trade.open_price,
            rate,
            commission_type: plan.commission_type,
            status: CommissionStatus::Credited,
            created_at: Utc::now(),
            reversed_at: None,
            reversed_by: None,
            reversal_reason: None,
        };

        match self.ledger.record_and_credit(record).await? {
            SettleOutcome::Credited { record, wallet } => {
                info!(
                    trade_id = record.trade_id,
                    ib_user_id = record.ib_user_id,
                    level = record.level,
                    amount = %record.commission_amount,
                    balance = %wallet.balance,
                    "Commission credited"
                );
                Ok(LevelOutcome::Paid(CommissionOutcome {
                    commission_id: record.commission_id,
                    ib_user_id: record.ib_user_id,
                    level: record.level,
                    amount: record.commission_amount,
                    commission_type: record.commission_type,
                    plan_id: plan.plan_id,
                    wallet_balance: wallet.balance,
                }))
            }
            SettleOutcome::AlreadyRecorded(existing) => {
                debug!(
                    trade_id = trade.trade_id,
                    ib_user_id = link.ib.user_id,
                    level = link.level,
                    commission_id = %existing.commission_id,
                    "Commission already recorded, skipping"
                );
                Ok(LevelOutcome::skipped(link, SkipReason::AlreadyPaid))
            }
        }
    }
}

impl LevelOutcome {
    fn skipped(link: &ChainLink, reason: SkipReason) -> Self {
        LevelOutcome::Skipped(SkippedLevel {
            ib_user_id: link.ib.user_id,
            level: link.level,
            reason,
        })
    }
}
