//! Main (trading) wallet collaborator
//!
//! The account service owns the user's main wallet; the engine only asks it
//! to credit funds moved out of an IB wallet.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core_types::UserId;
use crate::error::IbError;

#[async_trait]
pub trait MainWalletGateway: Send + Sync {
    /// Get adapter name for logging
    fn name(&self) -> &'static str;

    /// Credit `amount` to the user's main wallet.
    ///
    /// `reference` identifies the transfer; implementations should treat a
    /// repeated reference as already applied.
    async fn credit(
        &self,
        user_id: UserId,
        amount: Decimal,
        reference: &str,
    ) -> Result<(), IbError>;
}

/// Mock gateway for testing
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    pub struct MockMainWallet {
        credits: Mutex<Vec<(UserId, Decimal, String)>>,
        fail: AtomicBool,
    }

    impl MockMainWallet {
        pub fn new() -> Self {
            Self {
                credits: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            }
        }

        pub fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub fn credits(&self) -> Vec<(UserId, Decimal, String)> {
            self.credits.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MainWalletGateway for MockMainWallet {
        fn name(&self) -> &'static str {
            "mock-main-wallet"
        }

        async fn credit(
            &self,
            user_id: UserId,
            amount: Decimal,
            reference: &str,
        ) -> Result<(), IbError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(IbError::StoreUnavailable(
                    "mock main wallet offline".to_string(),
                ));
            }
            self.credits
                .lock()
                .unwrap()
                .push((user_id, amount, reference.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
pub use mock::MockMainWallet;
