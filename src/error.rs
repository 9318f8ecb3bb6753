//! Engine Error Types
//!
//! A single taxonomy shared by every store and service so that callers can
//! decide on retry vs. reject without matching on module-specific errors.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::core_types::UserId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IbError {
    /// User, plan, tier or commission record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation rejected because of the entity's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Parent-IB links loop back onto an already visited user
    #[error("Cyclic referral chain detected at user {0}")]
    CyclicChain(UserId),

    /// Transient store failure; the whole unit may be retried
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl IbError {
    /// Stable error code for API responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            IbError::NotFound(_) => "NOT_FOUND",
            IbError::InvalidState(_) => "INVALID_STATE",
            IbError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            IbError::InvalidAmount(_) => "INVALID_AMOUNT",
            IbError::CyclicChain(_) => "CYCLIC_CHAIN",
            IbError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    /// Only transient store failures are worth retrying.
    ///
    /// Retries must re-run the whole per-ancestor unit so the idempotency
    /// gate is consulted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IbError::StoreUnavailable(_))
    }

    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        IbError::NotFound(format!("{} {}", what, id))
    }
}

impl From<sqlx::Error> for IbError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => IbError::NotFound("row not found".to_string()),
            other => IbError::StoreUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(IbError::NotFound("user 1".into()).code(), "NOT_FOUND");
        assert_eq!(IbError::CyclicChain(7).code(), "CYCLIC_CHAIN");
        assert_eq!(
            IbError::InsufficientBalance {
                requested: Decimal::from(10),
                available: Decimal::from(5),
            }
            .code(),
            "INSUFFICIENT_BALANCE"
        );
    }

    #[test]
    fn test_only_store_errors_retry() {
        assert!(IbError::StoreUnavailable("timeout".into()).is_retryable());
        assert!(!IbError::InvalidState("reversed".into()).is_retryable());
        assert!(!IbError::CyclicChain(1).is_retryable());
    }

    #[test]
    fn test_sqlx_mapping() {
        assert_eq!(
            IbError::from(sqlx::Error::RowNotFound).code(),
            "NOT_FOUND"
        );
        assert!(IbError::from(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = IbError::not_found("user", 42);
        assert_eq!(err.to_string(), "Not found: user 42");
    }
}
