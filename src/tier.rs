//! Tier Progression Engine
//!
//! Recomputes an IB's qualifying tier from its direct-referral count and
//! applies upgrades. Tiers only ever move up on their own; the write is a
//! compare-and-set on the tier order so a stale concurrent check cannot
//! undo a newer upgrade.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core_types::{TierId, UserId};
use crate::directory::ReferralDirectory;
use crate::error::IbError;
use crate::plan::{PlanRegistry, Tier};

/// Compact tier reference used in results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierRef {
    pub tier_id: TierId,
    pub name: String,
    pub order: u32,
    pub referral_target: u64,
}

impl From<&Tier> for TierRef {
    fn from(t: &Tier) -> Self {
        Self {
            tier_id: t.tier_id,
            name: t.name.clone(),
            order: t.order,
            referral_target: t.referral_target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierUpgrade {
    pub upgraded: bool,
    pub previous_level: Option<TierRef>,
    pub new_level: TierRef,
    pub referral_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IbLevelProgress {
    pub current_level: Option<TierRef>,
    pub next_level: Option<TierRef>,
    pub referral_count: u64,
    pub referrals_needed: u64,
    /// 0..=100, two decimals
    pub progress_percent: Decimal,
    pub all_levels: Vec<Tier>,
}

/// Highest tier whose target the count meets. `tiers` ascending by order.
pub fn qualifying_tier(tiers: &[Tier], referral_count: u64) -> Option<&Tier> {
    let mut best: Option<&Tier> = None;
    for tier in tiers {
        if tier.referral_target <= referral_count
            && best.is_none_or(|b| tier.order > b.order)
        {
            best = Some(tier);
        }
    }
    best
}

/// `clamp(0, 100, (count - current) / (next - current) * 100)`
pub fn progress_percent(referral_count: u64, current_target: u64, next_target: u64) -> Decimal {
    if next_target <= current_target {
        return Decimal::ONE_HUNDRED;
    }
    let done = Decimal::from(referral_count) - Decimal::from(current_target);
    let span = Decimal::from(next_target - current_target);
    (done / span * Decimal::ONE_HUNDRED)
        .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub struct TierEngine {
    directory: Arc<dyn ReferralDirectory>,
    plans: Arc<PlanRegistry>,
}

impl TierEngine {
    pub fn new(directory: Arc<dyn ReferralDirectory>, plans: Arc<PlanRegistry>) -> Self {
        Self { directory, plans }
    }

    /// `None` when the IB is not active or has auto-upgrade disabled.
    pub async fn check_and_upgrade(
        &self,
        ib_user_id: UserId,
    ) -> Result<Option<TierUpgrade>, IbError> {
        let ib = self.directory.require_user(ib_user_id).await?;
        if !ib.is_active_ib() || !ib.auto_upgrade_enabled {
            debug!(
                ib_user_id,
                active = ib.is_active_ib(),
                auto_upgrade = ib.auto_upgrade_enabled,
                "Tier check skipped"
            );
            return Ok(None);
        }

        let referral_count = self.directory.count_direct_referrals(ib_user_id).await?;
        let tiers = self.plans.tiers().await?;
        let Some(best) = qualifying_tier(&tiers, referral_count) else {
            return Ok(None);
        };

        let current_order = ib.tier_order();
        let previous_level = tiers
            .iter()
            .find(|t| t.order == current_order)
            .map(TierRef::from);

        if best.order <= current_order {
            let current = previous_level.clone().unwrap_or_else(|| TierRef::from(best));
            return Ok(Some(TierUpgrade {
                upgraded: false,
                previous_level,
                new_level: current,
                referral_count,
            }));
        }

        let upgraded = self
            .directory
            .promote_tier(ib_user_id, best.tier_id, best.order)
            .await?;
        if upgraded {
            info!(
                ib_user_id,
                from = current_order,
                to = best.order,
                tier = %best.name,
                referral_count,
                "IB tier upgraded"
            );
        }

        Ok(Some(TierUpgrade {
            upgraded,
            previous_level,
            new_level: TierRef::from(best),
            referral_count,
        }))
    }

    pub async fn level_progress(&self, ib_user_id: UserId) -> Result<IbLevelProgress, IbError> {
        let ib = self.directory.require_user(ib_user_id).await?;
        let tiers = self.plans.tiers().await?;
        let referral_count = self.directory.count_direct_referrals(ib_user_id).await?;

        let current = tiers
            .iter()
            .find(|t| t.order == ib.tier_order())
            .or_else(|| tiers.first());
        let next = current.and_then(|c| tiers.iter().find(|t| t.order > c.order));

        let (referrals_needed, progress) = match (current, next) {
            (Some(c), Some(n)) => (
                n.referral_target.saturating_sub(referral_count),
                progress_percent(referral_count, c.referral_target, n.referral_target),
            ),
            _ => (0, Decimal::ONE_HUNDRED),
        };

        Ok(IbLevelProgress {
            current_level: current.map(TierRef::from),
            next_level: next.map(TierRef::from),
            referral_count,
            referrals_needed,
            progress_percent: progress,
            all_levels: tiers.clone(),
        })
    }
}
