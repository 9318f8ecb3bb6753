//! Commission ledger records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{TradeId, UserId};
use crate::error::IbError;
use crate::plan::CommissionType;

/// Commission record ID - ULID, sortable by creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommissionId(ulid::Ulid);

impl CommissionId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for CommissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CommissionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// At-most-once key: one payout per trade, IB and level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommissionKey {
    pub trade_id: TradeId,
    pub ib_user_id: UserId,
    pub level: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStatus {
    Credited,
    /// Terminal
    Reversed,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Credited => "CREDITED",
            CommissionStatus::Reversed => "REVERSED",
        }
    }
}

impl fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CommissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREDITED" => Ok(CommissionStatus::Credited),
            "REVERSED" => Ok(CommissionStatus::Reversed),
            _ => Err(format!("Invalid commission status: {}", s)),
        }
    }
}

/// Admin reversal details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reversal {
    pub reversed_by: UserId,
    pub reason: String,
    pub reversed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionRecord {
    pub commission_id: CommissionId,
    pub trade_id: TradeId,
    pub trader_user_id: UserId,
    pub ib_user_id: UserId,
    pub level: u32,
    /// Lot size the commission was computed on
    pub base_amount: Decimal,
    pub commission_amount: Decimal,
    pub symbol: String,
    pub trade_lot_size: Decimal,
    pub contract_size: Decimal,
    pub open_price: Decimal,
    pub rate: Decimal,
    pub commission_type: CommissionType,
    pub status: CommissionStatus,
    pub created_at: DateTime<Utc>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversed_by: Option<UserId>,
    pub reversal_reason: Option<String>,
}

impl CommissionRecord {
    pub fn key(&self) -> CommissionKey {
        CommissionKey {
            trade_id: self.trade_id,
            ib_user_id: self.ib_user_id,
            level: self.level,
        }
    }

    /// CREDITED → REVERSED; anything else is `InvalidState`.
    pub fn mark_reversed(&mut self, reversal: &Reversal) -> Result<(), IbError> {
        if self.status == CommissionStatus::Reversed {
            return Err(IbError::InvalidState(format!(
                "commission {} already reversed",
                self.commission_id
            )));
        }
        self.status = CommissionStatus::Reversed;
        self.reversed_at = Some(reversal.reversed_at);
        self.reversed_by = Some(reversal.reversed_by);
        self.reversal_reason = Some(reversal.reason.clone());
        Ok(())
    }

    #[inline]
    pub fn is_credited(&self) -> bool {
        self.status == CommissionStatus::Credited
    }
}
