//! Commission math
//!
//! - PER_LOT:  `lots * rate`
//! - PERCENT:  `lots * contract_size * open_price * rate / 100`
//!
//! Results are rounded to `scale` decimal places, midpoint away from zero.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::IbError;
use crate::plan::CommissionType;

/// Default amount precision
pub const DEFAULT_AMOUNT_SCALE: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionInput {
    pub commission_type: CommissionType,
    pub rate: Decimal,
    pub lots: Decimal,
    pub contract_size: Decimal,
    pub open_price: Decimal,
}

/// Commission for one ancestor. Callers skip the level when this is `<= 0`.
///
/// Fails with `InvalidAmount` when the product leaves `Decimal` range.
pub fn commission_amount(input: &CommissionInput, scale: u32) -> Result<Decimal, IbError> {
    let raw = match input.commission_type {
        CommissionType::PerLot => input.lots.checked_mul(input.rate),
        CommissionType::Percent => input
            .lots
            .checked_mul(input.contract_size)
            .and_then(|v| v.checked_mul(input.open_price))
            .and_then(|v| v.checked_mul(input.rate))
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED)),
    }
    .ok_or_else(|| {
        IbError::InvalidAmount(format!(
            "commission overflow: {} lots at rate {}",
            input.lots, input.rate
        ))
    })?;
    Ok(raw.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn per_lot(lots: Decimal, rate: Decimal) -> CommissionInput {
        CommissionInput {
            commission_type: CommissionType::PerLot,
            rate,
            lots,
            contract_size: Decimal::from(100_000),
            open_price: Decimal::ONE,
        }
    }

    #[test]
    fn test_per_lot() {
        let two = Decimal::from(2);
        for (rate, expected) in [(5, 10), (3, 6), (1, 2)] {
            let amount = commission_amount(&per_lot(two, Decimal::from(rate)), 8).unwrap();
            assert_eq!(amount, Decimal::from(expected));
        }
    }

    #[test]
    fn test_per_lot_ignores_price_and_size() {
        let mut input = per_lot(Decimal::new(15, 1), Decimal::new(25, 1));
        let expected = commission_amount(&input, 8).unwrap();
        input.open_price = Decimal::from(65_000);
        input.contract_size = Decimal::ONE;
        assert_eq!(commission_amount(&input, 8).unwrap(), expected);
        assert_eq!(expected, Decimal::new(375, 2)); // 1.5 * 2.5
    }

    #[test]
    fn test_percent_fx() {
        // 0.5 lot EURUSD @ 1.0850, 0.01% → 0.5 * 100000 * 1.085 * 0.0001
        let input = CommissionInput {
            commission_type: CommissionType::Percent,
            rate: Decimal::new(1, 2),
            lots: Decimal::new(5, 1),
            contract_size: Decimal::from(100_000),
            open_price: Decimal::new(10850, 4),
        };
        assert_eq!(commission_amount(&input, 8).unwrap(), Decimal::new(5425, 3));
    }

    #[test]
    fn test_percent_crypto() {
        // 0.1 BTC lot @ 60000, 0.05% → 3
        let input = CommissionInput {
            commission_type: CommissionType::Percent,
            rate: Decimal::new(5, 2),
            lots: Decimal::new(1, 1),
            contract_size: Decimal::ONE,
            open_price: Decimal::from(60_000),
        };
        assert_eq!(commission_amount(&input, 8).unwrap(), Decimal::from(3));
    }

    #[test]
    fn test_rounding_to_scale() {
        // 0.333 lots * 1.005 = 0.334665
        let input = per_lot(Decimal::new(333, 3), Decimal::new(1005, 3));
        assert_eq!(commission_amount(&input, 2).unwrap(), Decimal::new(33, 2));
        assert_eq!(commission_amount(&input, 5).unwrap(), Decimal::new(33467, 5));
    }

    #[test]
    fn test_dust_rounds_to_zero() {
        let input = per_lot(Decimal::new(1, 3), Decimal::new(1, 3));
        assert!(commission_amount(&input, 4).unwrap().is_zero());
    }

    #[test]
    fn test_overflow_is_an_error() {
        let input = per_lot(Decimal::MAX, Decimal::from(5));
        let err = commission_amount(&input, 8).unwrap_err();
        assert_eq!(err.code(), "INVALID_AMOUNT");

        let input = CommissionInput {
            commission_type: CommissionType::Percent,
            rate: Decimal::ONE,
            lots: Decimal::from(u64::MAX),
            contract_size: Decimal::from(100_000),
            open_price: Decimal::from(100_000),
        };
        assert!(commission_amount(&input, 8).is_err());
    }
}
