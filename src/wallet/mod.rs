//! Wallet Ledger
//!
//! Per-IB balance / earned / withdrawn / pending state. [`WalletLedger`]
//! is the only entry point for mutations; the store serializes them per
//! wallet and [`Wallet::apply`] enforces the numeric invariants.

pub mod gateway;
pub mod models;

pub use gateway::MainWalletGateway;
pub use models::{Wallet, WalletOp};

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core_types::UserId;
use crate::error::IbError;
use crate::ledger::LedgerStore;

pub struct WalletLedger {
    store: Arc<dyn LedgerStore>,
}

impl WalletLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn get_or_create_wallet(&self, ib_user_id: UserId) -> Result<Wallet, IbError> {
        self.store.get_or_create_wallet(ib_user_id).await
    }

    pub async fn credit_commission(
        &self,
        ib_user_id: UserId,
        amount: Decimal,
    ) -> Result<Wallet, IbError> {
        self.apply(ib_user_id, WalletOp::Credit(amount)).await
    }

    pub async fn request_withdrawal(
        &self,
        ib_user_id: UserId,
        amount: Decimal,
    ) -> Result<Wallet, IbError> {
        self.apply(ib_user_id, WalletOp::RequestWithdrawal(amount))
            .await
    }

    /// `amount` must match an open request; it is only checked against the
    /// aggregate `pending_withdrawal`.
    pub async fn complete_withdrawal(
        &self,
        ib_user_id: UserId,
        amount: Decimal,
    ) -> Result<Wallet, IbError> {
        self.apply(ib_user_id, WalletOp::CompleteWithdrawal(amount))
            .await
    }

    pub async fn cancel_withdrawal(
        &self,
        ib_user_id: UserId,
        amount: Decimal,
    ) -> Result<Wallet, IbError> {
        self.apply(ib_user_id, WalletOp::CancelWithdrawal(amount))
            .await
    }

    async fn apply(&self, ib_user_id: UserId, op: WalletOp) -> Result<Wallet, IbError> {
        match self.store.apply_wallet_op(ib_user_id, op).await {
            Ok(wallet) => {
                info!(
                    ib_user_id,
                    op = %op,
                    balance = %wallet.balance,
                    pending = %wallet.pending_withdrawal,
                    "Wallet updated"
                );
                if !wallet.reconciliation_debt.is_zero() && matches!(op, WalletOp::Reverse(_)) {
                    warn!(
                        ib_user_id,
                        debt = %wallet.reconciliation_debt,
                        "Reversal clamped at zero, reconciliation debt outstanding"
                    );
                }
                Ok(wallet)
            }
            Err(e) => {
                warn!(ib_user_id, op = %op, error = %e, "Wallet operation rejected");
                Err(e)
            }
        }
    }
}
