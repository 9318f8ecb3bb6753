//! Commission plans and IB tiers

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core_types::{MAX_COMMISSION_LEVELS, PlanId, TierId};
use crate::error::IbError;

/// Payout model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionType {
    /// `lots * rate`
    PerLot,
    /// `lots * contract_size * open_price * rate / 100`
    Percent,
}

impl CommissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionType::PerLot => "PER_LOT",
            CommissionType::Percent => "PERCENT",
        }
    }
}

impl fmt::Display for CommissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CommissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PER_LOT" => Ok(CommissionType::PerLot),
            "PERCENT" => Ok(CommissionType::Percent),
            _ => Err(format!("Invalid commission type: {}", s)),
        }
    }
}

/// Rate paid to the ancestor at `level` (1 = direct recruiter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRate {
    pub level: u32,
    pub rate: Decimal,
}

/// Which trade revenues feed the plan. Informational for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSources {
    pub spread: bool,
    pub trade_commission: bool,
    pub swap: bool,
}

impl Default for CommissionSources {
    fn default() -> Self {
        Self {
            spread: true,
            trade_commission: true,
            swap: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionPlan {
    /// 0 until the store assigns one
    pub plan_id: PlanId,
    pub name: String,
    pub is_default: bool,
    pub max_levels: u32,
    pub commission_type: CommissionType,
    pub levels: Vec<LevelRate>,
    #[serde(default)]
    pub sources: CommissionSources,
}

impl CommissionPlan {
    /// Build a plan whose levels are numbered 1.. in the order of `rates`
    pub fn from_rates(name: &str, commission_type: CommissionType, rates: &[Decimal]) -> Self {
        Self {
            plan_id: 0,
            name: name.to_string(),
            is_default: false,
            max_levels: rates.len() as u32,
            commission_type,
            levels: rates
                .iter()
                .enumerate()
                .map(|(i, rate)| LevelRate {
                    level: i as u32 + 1,
                    rate: *rate,
                })
                .collect(),
            sources: CommissionSources::default(),
        }
    }

    /// Rate for `level`; `None` beyond `max_levels` or when not tabulated
    pub fn rate_for(&self, level: u32) -> Option<Decimal> {
        if level == 0 || level > self.max_levels {
            return None;
        }
        self.levels
            .iter()
            .find(|l| l.level == level)
            .map(|l| l.rate)
    }

    /// Level numbers must be unique and contiguous from 1 to `max_levels`.
    pub fn validate(&self) -> Result<(), IbError> {
        if self.max_levels == 0 || self.max_levels > MAX_COMMISSION_LEVELS {
            return Err(IbError::InvalidState(format!(
                "plan '{}': max_levels {} outside 1..={}",
                self.name, self.max_levels, MAX_COMMISSION_LEVELS
            )));
        }

        let mut seen: Vec<u32> = self.levels.iter().map(|l| l.level).collect();
        seen.sort_unstable();
        let expected: Vec<u32> = (1..=self.max_levels).collect();
        if seen != expected {
            return Err(IbError::InvalidState(format!(
                "plan '{}': levels {:?} must be exactly 1..={}",
                self.name, seen, self.max_levels
            )));
        }

        if let Some(bad) = self.levels.iter().find(|l| l.rate < Decimal::ZERO) {
            return Err(IbError::InvalidState(format!(
                "plan '{}': negative rate at level {}",
                self.name, bad.level
            )));
        }

        Ok(())
    }
}

/// IB tier (IB level): rank gated by direct-referral count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// 0 until the store assigns one
    #[serde(default)]
    pub tier_id: TierId,
    pub name: String,
    pub order: u32,
    pub referral_target: u64,
    pub commission_rate: Decimal,
    pub commission_type: CommissionType,
    /// level (1..=5) → rate
    pub downline_commission: BTreeMap<u32, Decimal>,
}

/// Orders and targets strictly increasing, first target 0.
pub fn validate_ladder(tiers: &[Tier]) -> Result<(), IbError> {
    let first = tiers
        .first()
        .ok_or_else(|| IbError::InvalidState("tier ladder is empty".to_string()))?;
    if first.referral_target != 0 {
        return Err(IbError::InvalidState(format!(
            "lowest tier '{}' must have referral target 0",
            first.name
        )));
    }

    for pair in tiers.windows(2) {
        let (lo, hi) = (&pair[0], &pair[1]);
        if hi.order <= lo.order || hi.referral_target <= lo.referral_target {
            return Err(IbError::InvalidState(format!(
                "tier '{}' must rank strictly above '{}'",
                hi.name, lo.name
            )));
        }
    }

    for tier in tiers {
        if tier
            .downline_commission
            .keys()
            .any(|lvl| *lvl == 0 || *lvl > MAX_COMMISSION_LEVELS)
        {
            return Err(IbError::InvalidState(format!(
                "tier '{}': downline levels must be within 1..={}",
                tier.name, MAX_COMMISSION_LEVELS
            )));
        }
    }

    Ok(())
}

/// Ladder inserted when the tier collection is empty.
pub fn default_tier_ladder() -> Vec<Tier> {
    // (name, target, per-lot rate, downline rates for levels 1..=5)
    const LADDER: [(&str, u64, i64, [i64; 5]); 5] = [
        ("Bronze", 0, 50, [50, 20, 10, 5, 0]),
        ("Silver", 5, 70, [70, 30, 15, 5, 5]),
        ("Gold", 15, 90, [90, 40, 20, 10, 5]),
        ("Platinum", 30, 110, [110, 50, 25, 15, 10]),
        ("Diamond", 50, 150, [150, 60, 30, 20, 10]),
    ];

    LADDER
        .iter()
        .enumerate()
        .map(|(i, (name, target, rate, downline))| Tier {
            tier_id: 0,
            name: name.to_string(),
            order: i as u32 + 1,
            referral_target: *target,
            // rates are in tenths of a currency unit per lot
            commission_rate: Decimal::new(*rate, 1),
            commission_type: CommissionType::PerLot,
            downline_commission: downline
                .iter()
                .enumerate()
                .map(|(lvl, r)| (lvl as u32 + 1, Decimal::new(*r, 1)))
                .collect(),
        })
        .collect()
}
