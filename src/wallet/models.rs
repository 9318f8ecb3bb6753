//! IB wallet state and its transitions
//!
//! Every mutation goes through [`Wallet::apply`], which either applies the
//! whole operation or leaves the wallet untouched.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core_types::UserId;
use crate::error::IbError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub ib_user_id: UserId,
    pub balance: Decimal,
    pub total_earned: Decimal,
    pub total_withdrawn: Decimal,
    pub pending_withdrawal: Decimal,
    /// Deficit dropped by reversal clamping; balance stays at 0
    pub reconciliation_debt: Decimal,
    pub last_updated: DateTime<Utc>,
}

/// Wallet mutation. Amounts must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletOp {
    /// `balance += a; total_earned += a`
    Credit(Decimal),
    /// `balance -= a; pending_withdrawal += a`
    RequestWithdrawal(Decimal),
    /// `pending_withdrawal -= a; total_withdrawn += a`
    CompleteWithdrawal(Decimal),
    /// `pending_withdrawal -= a; balance += a`
    CancelWithdrawal(Decimal),
    /// `balance -= a; total_earned -= a`, each clamped at 0
    Reverse(Decimal),
}

impl WalletOp {
    pub fn amount(&self) -> Decimal {
        match *self {
            WalletOp::Credit(a)
            | WalletOp::RequestWithdrawal(a)
            | WalletOp::CompleteWithdrawal(a)
            | WalletOp::CancelWithdrawal(a)
            | WalletOp::Reverse(a) => a,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletOp::Credit(_) => "CREDIT",
            WalletOp::RequestWithdrawal(_) => "WITHDRAW_REQUEST",
            WalletOp::CompleteWithdrawal(_) => "WITHDRAW_COMPLETE",
            WalletOp::CancelWithdrawal(_) => "WITHDRAW_CANCEL",
            WalletOp::Reverse(_) => "REVERSAL",
        }
    }
}

impl fmt::Display for WalletOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.amount())
    }
}

impl Wallet {
    /// Zeroed wallet
    pub fn new(ib_user_id: UserId) -> Self {
        Self {
            ib_user_id,
            balance: Decimal::ZERO,
            total_earned: Decimal::ZERO,
            total_withdrawn: Decimal::ZERO,
            pending_withdrawal: Decimal::ZERO,
            reconciliation_debt: Decimal::ZERO,
            last_updated: Utc::now(),
        }
    }

    pub fn apply(&mut self, op: WalletOp) -> Result<(), IbError> {
        let amount = op.amount();
        if amount <= Decimal::ZERO {
            return Err(IbError::InvalidAmount(format!(
                "{} amount must be positive, got {}",
                op.as_str(),
                amount
            )));
        }

        // new values are computed in full before any field is written
        match op {
            WalletOp::Credit(a) => {
                let balance = checked_add(op, self.balance, a)?;
                let earned = checked_add(op, self.total_earned, a)?;
                self.balance = balance;
                self.total_earned = earned;
            }
            WalletOp::RequestWithdrawal(a) => {
                if a > self.balance {
                    return Err(IbError::InsufficientBalance {
                        requested: a,
                        available: self.balance,
                    });
                }
                let pending = checked_add(op, self.pending_withdrawal, a)?;
                self.balance -= a;
                self.pending_withdrawal = pending;
            }
            WalletOp::CompleteWithdrawal(a) => {
                self.check_pending(op, a)?;
                let withdrawn = checked_add(op, self.total_withdrawn, a)?;
                self.pending_withdrawal -= a;
                self.total_withdrawn = withdrawn;
            }
            WalletOp::CancelWithdrawal(a) => {
                self.check_pending(op, a)?;
                let balance = checked_add(op, self.balance, a)?;
                self.pending_withdrawal -= a;
                self.balance = balance;
            }
            WalletOp::Reverse(a) => {
                // both sides are non-negative, so the differences stay in range
                let balance = self.balance - a;
                let earned = self.total_earned - a;
                let shortfall = (-balance).max(-earned).max(Decimal::ZERO);
                let debt = checked_add(op, self.reconciliation_debt, shortfall)?;

                self.balance = balance.max(Decimal::ZERO);
                self.total_earned = earned.max(Decimal::ZERO);
                self.reconciliation_debt = debt;
            }
        }

        self.last_updated = Utc::now();
        Ok(())
    }

    fn check_pending(&self, op: WalletOp, amount: Decimal) -> Result<(), IbError> {
        if amount > self.pending_withdrawal {
            return Err(IbError::InvalidAmount(format!(
                "{} of {} exceeds pending withdrawal {}",
                op.as_str(),
                amount,
                self.pending_withdrawal
            )));
        }
        Ok(())
    }

    /// `balance + pending + withdrawn == earned`; holds until a reversal clamps.
    pub fn is_balanced(&self) -> bool {
        self.balance
            .checked_add(self.pending_withdrawal)
            .and_then(|v| v.checked_add(self.total_withdrawn))
            == Some(self.total_earned)
    }
}

fn checked_add(op: WalletOp, current: Decimal, amount: Decimal) -> Result<Decimal, IbError> {
    current.checked_add(amount).ok_or_else(|| {
        IbError::InvalidAmount(format!("{} of {} overflows {}", op.as_str(), amount, current))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn funded(amount: i64) -> Wallet {
        let mut w = Wallet::new(1);
        w.apply(WalletOp::Credit(d(amount))).unwrap();
        w
    }

    #[test]
    fn test_credit() {
        let w = funded(10);
        assert_eq!(w.balance, d(10));
        assert_eq!(w.total_earned, d(10));
        assert!(w.is_balanced());
    }

    #[test]
    fn test_withdrawal_lifecycle() {
        let mut w = funded(100);

        w.apply(WalletOp::RequestWithdrawal(d(40))).unwrap();
        assert_eq!(w.balance, d(60));
        assert_eq!(w.pending_withdrawal, d(40));
        assert!(w.is_balanced());

        w.apply(WalletOp::CompleteWithdrawal(d(30))).unwrap();
        assert_eq!(w.pending_withdrawal, d(10));
        assert_eq!(w.total_withdrawn, d(30));
        assert!(w.is_balanced());

        w.apply(WalletOp::CancelWithdrawal(d(10))).unwrap();
        assert_eq!(w.pending_withdrawal, d(0));
        assert_eq!(w.balance, d(70));
        assert!(w.is_balanced());
    }

    #[test]
    fn test_insufficient_balance_leaves_wallet_unchanged() {
        let mut w = funded(10);
        let before = w.clone();

        let err = w.apply(WalletOp::RequestWithdrawal(d(11))).unwrap_err();
        assert_eq!(
            err,
            IbError::InsufficientBalance {
                requested: d(11),
                available: d(10),
            }
        );
        assert_eq!(w, before);
    }

    #[test]
    fn test_pending_cannot_go_negative() {
        let mut w = funded(10);
        w.apply(WalletOp::RequestWithdrawal(d(5))).unwrap();
        let before = w.clone();

        assert!(matches!(
            w.apply(WalletOp::CompleteWithdrawal(d(6))),
            Err(IbError::InvalidAmount(_))
        ));
        assert!(matches!(
            w.apply(WalletOp::CancelWithdrawal(d(6))),
            Err(IbError::InvalidAmount(_))
        ));
        assert_eq!(w, before);
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        let mut w = funded(10);
        for op in [
            WalletOp::Credit(d(0)),
            WalletOp::RequestWithdrawal(d(-1)),
            WalletOp::Reverse(d(0)),
        ] {
            assert!(matches!(w.apply(op), Err(IbError::InvalidAmount(_))));
        }
        assert_eq!(w.balance, d(10));
    }

    #[test]
    fn test_reversal_within_balance() {
        let mut w = funded(18);
        w.apply(WalletOp::Reverse(d(10))).unwrap();
        assert_eq!(w.balance, d(8));
        assert_eq!(w.total_earned, d(8));
        assert_eq!(w.reconciliation_debt, d(0));
    }

    #[test]
    fn test_reversal_clamps_and_tracks_debt() {
        let mut w = funded(10);
        w.apply(WalletOp::RequestWithdrawal(d(8))).unwrap();
        w.apply(WalletOp::CompleteWithdrawal(d(8))).unwrap();

        // balance 2, earned 10: reversing 10 would leave balance at -8
        w.apply(WalletOp::Reverse(d(10))).unwrap();
        assert_eq!(w.balance, d(0));
        assert_eq!(w.total_earned, d(0));
        assert_eq!(w.reconciliation_debt, d(8));
    }

    #[test]
    fn test_overflowing_credit_leaves_wallet_unchanged() {
        let mut w = funded(10);
        let before = w.clone();

        let err = w.apply(WalletOp::Credit(Decimal::MAX)).unwrap_err();
        assert_eq!(err.code(), "INVALID_AMOUNT");
        assert_eq!(w, before);
    }

    #[test]
    fn test_invariant_over_operation_sequence() {
        let mut w = Wallet::new(1);
        let ops = [
            WalletOp::Credit(d(50)),
            WalletOp::RequestWithdrawal(d(20)),
            WalletOp::Credit(d(5)),
            WalletOp::CancelWithdrawal(d(5)),
            WalletOp::RequestWithdrawal(d(30)),
            WalletOp::CompleteWithdrawal(d(45)),
            WalletOp::RequestWithdrawal(d(100)),
        ];

        for op in ops {
            let _ = w.apply(op);
            assert!(w.balance >= Decimal::ZERO);
            assert!(w.is_balanced(), "unbalanced after {}", op);
        }
        assert_eq!(w.total_withdrawn, d(45));
        assert_eq!(w.balance, d(10));
    }
}
