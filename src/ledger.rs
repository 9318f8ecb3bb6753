//! Commission ledger store
//!
//! Commission records and wallets live behind one trait because the
//! idempotency gate and the wallet credit have to commit as a single unit,
//! and so do a reversal and its wallet debit.
//!
//! # Safety Invariants
//!
//! 1. **At-most-once**: `(trade_id, ib_user_id, level)` is recorded at most
//!    once; a duplicate never touches the wallet.
//! 2. **Single writer per wallet**: every wallet mutation is serialized per
//!    `ib_user_id`; different wallets proceed in parallel.
//! 3. **All or nothing**: if the wallet rejects the operation, the record
//!    insert / status change is not kept.

use async_trait::async_trait;

use crate::commission::record::{CommissionId, CommissionKey, CommissionRecord, Reversal};
use crate::core_types::UserId;
use crate::error::IbError;
use crate::wallet::{Wallet, WalletOp};

/// Result of the idempotency gate
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// New record stored and wallet credited
    Credited {
        record: CommissionRecord,
        wallet: Wallet,
    },
    /// Key already recorded; nothing changed
    AlreadyRecorded(CommissionRecord),
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_wallet(&self, ib_user_id: UserId) -> Result<Option<Wallet>, IbError>;

    async fn get_or_create_wallet(&self, ib_user_id: UserId) -> Result<Wallet, IbError>;

    /// Apply `op` under the wallet's write lock (creating a zeroed wallet
    /// first if needed) and persist the result.
    async fn apply_wallet_op(&self, ib_user_id: UserId, op: WalletOp) -> Result<Wallet, IbError>;

    /// Insert `record` unless its key exists, and credit its amount to the
    /// IB's wallet in the same unit.
    async fn record_and_credit(
        &self,
        record: CommissionRecord,
    ) -> Result<SettleOutcome, IbError>;

    async fn get_commission(
        &self,
        commission_id: CommissionId,
    ) -> Result<Option<CommissionRecord>, IbError>;

    async fn find_commission(
        &self,
        key: &CommissionKey,
    ) -> Result<Option<CommissionRecord>, IbError>;

    /// Records paid to `ib_user_id`, newest first
    async fn list_commissions_for_ib(
        &self,
        ib_user_id: UserId,
    ) -> Result<Vec<CommissionRecord>, IbError>;

    /// CREDITED → REVERSED plus the matching wallet reversal, as one unit.
    async fn reverse_commission(
        &self,
        commission_id: CommissionId,
        reversal: Reversal,
    ) -> Result<(CommissionRecord, Wallet), IbError>;
}
