//! IB identity fields as carried on the user record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{PlanId, TierId, UserId};

/// IB application / activation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IbStatus {
    /// Applied, waiting for admin approval
    Pending,
    /// Approved; receives commission
    Active,
    /// Blocked by admin; stops the chain walk
    Blocked,
}

impl IbStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IbStatus::Pending => "PENDING",
            IbStatus::Active => "ACTIVE",
            IbStatus::Blocked => "BLOCKED",
        }
    }
}

impl fmt::Display for IbStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IbStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(IbStatus::Pending),
            "ACTIVE" => Ok(IbStatus::Active),
            "BLOCKED" => Ok(IbStatus::Blocked),
            _ => Err(format!("Invalid IB status: {}", s)),
        }
    }
}

/// IB view of a user record.
///
/// Owned by the user directory; the engine reads it and writes back only the
/// IB fields (status, plan, tier, parent link).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IbProfile {
    pub user_id: UserId,
    pub is_ib: bool,
    /// `None` until the user applies
    pub ib_status: Option<IbStatus>,
    pub referral_code: Option<String>,
    /// Referral code of the recruiter
    pub referred_by: Option<String>,
    pub parent_ib_id: Option<UserId>,
    pub ib_plan_id: Option<PlanId>,
    pub ib_level_id: Option<TierId>,
    pub ib_level_order: Option<u32>,
    pub auto_upgrade_enabled: bool,
    pub blocked_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IbProfile {
    /// Plain (non-IB) user record
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            is_ib: false,
            ib_status: None,
            referral_code: None,
            referred_by: None,
            parent_ib_id: None,
            ib_plan_id: None,
            ib_level_id: None,
            ib_level_order: None,
            auto_upgrade_enabled: true,
            blocked_reason: None,
            created_at: Utc::now(),
        }
    }

    /// Only active IBs earn commission and extend the chain.
    #[inline]
    pub fn is_active_ib(&self) -> bool {
        self.is_ib && self.ib_status == Some(IbStatus::Active)
    }

    /// Current tier order, 0 when no tier was ever assigned
    #[inline]
    pub fn tier_order(&self) -> u32 {
        self.ib_level_order.unwrap_or(0)
    }
}

/// Fields written when a pending applicant is approved
#[derive(Debug, Clone, PartialEq)]
pub struct IbActivation {
    pub plan_id: PlanId,
    pub tier_id: TierId,
    pub tier_order: u32,
    /// Claimed only if the applicant has no code yet
    pub referral_code: String,
}
