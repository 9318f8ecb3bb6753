//! Read-only IB views: dashboard stats and commission history.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::commission::{CommissionRecord, CommissionStatus};
use crate::core_types::{TradeId, UserId};
use crate::directory::ReferralDirectory;
use crate::error::IbError;
use crate::ledger::LedgerStore;
use crate::wallet::Wallet;

/// Window for `active_traders_last_30d`
const ACTIVE_TRADER_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelStats {
    pub count: u64,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IbStats {
    pub ib_user_id: UserId,
    pub direct_referrals: u64,
    /// Distinct users below the IB, up to the commission depth
    pub total_downline: u64,
    /// Credited commissions only; reversals are excluded
    pub total_commission: Decimal,
    pub total_trades: u64,
    pub active_traders_last_30d: u64,
    pub per_level: BTreeMap<u32, LevelStats>,
    pub wallet: Option<Wallet>,
}

pub struct IbStatsService {
    directory: Arc<dyn ReferralDirectory>,
    ledger: Arc<dyn LedgerStore>,
    max_depth: u32,
}

impl IbStatsService {
    pub fn new(
        directory: Arc<dyn ReferralDirectory>,
        ledger: Arc<dyn LedgerStore>,
        max_depth: u32,
    ) -> Self {
        Self {
            directory,
            ledger,
            max_depth,
        }
    }

    pub async fn stats(&self, ib_user_id: UserId) -> Result<IbStats, IbError> {
        self.directory.require_user(ib_user_id).await?;

        let direct_referrals = self.directory.count_direct_referrals(ib_user_id).await?;
        let total_downline = self.downline_size(ib_user_id).await?;
        let records = self.ledger.list_commissions_for_ib(ib_user_id).await?;
        let wallet = self.ledger.get_wallet(ib_user_id).await?;

        let since = Utc::now() - Duration::days(ACTIVE_TRADER_WINDOW_DAYS);
        let mut trades: FxHashSet<TradeId> = FxHashSet::default();
        let mut recent_traders: FxHashSet<UserId> = FxHashSet::default();
        let mut per_level: BTreeMap<u32, LevelStats> = BTreeMap::new();
        let mut total_commission = Decimal::ZERO;

        for record in records.iter().filter(|r| r.status == CommissionStatus::Credited) {
            total_commission = total_commission.saturating_add(record.commission_amount);
            trades.insert(record.trade_id);
            if record.created_at >= since {
                recent_traders.insert(record.trader_user_id);
            }
            let level = per_level.entry(record.level).or_default();
            level.count += 1;
            level.amount = level.amount.saturating_add(record.commission_amount);
        }

        Ok(IbStats {
            ib_user_id,
            direct_referrals,
            total_downline,
            total_commission,
            total_trades: trades.len() as u64,
            active_traders_last_30d: recent_traders.len() as u64,
            per_level,
            wallet,
        })
    }

    /// Newest first.
    pub async fn commission_history(
        &self,
        ib_user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CommissionRecord>, IbError> {
        let records = self.ledger.list_commissions_for_ib(ib_user_id).await?;
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    /// BFS over `parent_ib_id` links, `max_depth` levels deep.
    async fn downline_size(&self, ib_user_id: UserId) -> Result<u64, IbError> {
        let mut seen: FxHashSet<UserId> = FxHashSet::default();
        seen.insert(ib_user_id);
        let mut queue = VecDeque::from([(ib_user_id, 0u32)]);
        let mut total = 0u64;

        while let Some((id, depth)) = queue.pop_front() {
            if depth >= self.max_depth {
                continue;
            }
            for child in self.directory.direct_referrals(id).await? {
                if seen.insert(child) {
                    total += 1;
                    queue.push_back((child, depth + 1));
                }
            }
        }
        Ok(total)
    }
}
