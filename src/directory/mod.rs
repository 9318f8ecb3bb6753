//! Referral Directory
//!
//! Read view over user records: referral code → user, user → parent IB,
//! IB status. The directory itself belongs to the account service; the
//! engine only consumes it through [`ReferralDirectory`].

pub mod models;

pub use models::{IbActivation, IbProfile, IbStatus};

use async_trait::async_trait;
use rand::Rng;

use crate::core_types::{TierId, UserId};
use crate::error::IbError;

/// Referral code alphabet (no 0/O/1/I to keep codes readable)
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Referral code length
pub const REFERRAL_CODE_LEN: usize = 8;

#[async_trait]
pub trait ReferralDirectory: Send + Sync {
    async fn get_user(&self, user_id: UserId) -> Result<Option<IbProfile>, IbError>;

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<IbProfile>, IbError>;

    /// Upsert the whole record. Used for directory sync and seeding; engine
    /// commands go through the field-scoped updates below.
    async fn save_profile(&self, profile: &IbProfile) -> Result<(), IbError>;

    /// Insert `profile` unless the user exists; returns the stored record.
    async fn create_user_if_absent(&self, profile: &IbProfile) -> Result<IbProfile, IbError>;

    /// Set `parent_ib_id` and `referred_by` only while the user has no parent.
    ///
    /// `None` when the user is already linked.
    async fn link_parent(
        &self,
        user_id: UserId,
        parent_ib_id: UserId,
        referred_by: &str,
    ) -> Result<Option<IbProfile>, IbError>;

    /// Non-IB user without a pending application → PENDING. An existing
    /// referral code is kept, otherwise `referral_code` is claimed.
    ///
    /// `None` when the user is already an IB or already pending.
    async fn open_application(
        &self,
        user_id: UserId,
        referral_code: &str,
    ) -> Result<Option<IbProfile>, IbError>;

    /// PENDING → ACTIVE on the given plan. The entry tier is only applied
    /// when it ranks above the stored tier.
    ///
    /// `None` when the user is no longer pending.
    async fn activate_ib(
        &self,
        user_id: UserId,
        activation: &IbActivation,
    ) -> Result<Option<IbProfile>, IbError>;

    /// Status CAS: move to `to` only from one of `from`, recording `reason`.
    ///
    /// `None` when the current status is not in `from`.
    async fn transition_ib_status(
        &self,
        user_id: UserId,
        from: &[IbStatus],
        to: IbStatus,
        reason: Option<&str>,
    ) -> Result<Option<IbProfile>, IbError>;

    /// Users whose `parent_ib_id` is `ib_user_id`
    async fn direct_referrals(&self, ib_user_id: UserId) -> Result<Vec<UserId>, IbError>;

    /// Atomic CAS: move the user to `tier_id` only if `order` ranks above
    /// the stored tier order.
    ///
    /// Returns true if the tier changed, false if the stored tier is already
    /// at or above `order` (a concurrent upgrade won).
    async fn promote_tier(
        &self,
        user_id: UserId,
        tier_id: TierId,
        order: u32,
    ) -> Result<bool, IbError>;

    async fn count_direct_referrals(&self, ib_user_id: UserId) -> Result<u64, IbError> {
        Ok(self.direct_referrals(ib_user_id).await?.len() as u64)
    }

    /// Fetch a user or fail with `NotFound`
    async fn require_user(&self, user_id: UserId) -> Result<IbProfile, IbError> {
        self.get_user(user_id)
            .await?
            .ok_or_else(|| IbError::not_found("user", user_id))
    }
}

/// Random referral code; uniqueness is checked by the caller.
pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referral_code_shape() {
        for _ in 0..100 {
            let code = generate_referral_code();
            assert_eq!(code.len(), REFERRAL_CODE_LEN);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }
}
