//! Referral linking at signup
//!
//! A new user's `referred_by` code resolves to a recruiting IB and becomes
//! the user's `parent_ib_id`. Links are only made to active IBs and never
//! close a loop in the referral graph.

use rustc_hash::FxHashSet;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core_types::UserId;
use crate::directory::{IbProfile, ReferralDirectory};
use crate::error::IbError;
use crate::tier::{TierEngine, TierUpgrade};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationOutcome {
    pub user_id: UserId,
    /// None when no code was given or the code did not resolve
    pub parent_ib_id: Option<UserId>,
    /// Recruiter's tier check, when run
    pub tier_upgrade: Option<TierUpgrade>,
}

pub struct ReferralLinker {
    directory: Arc<dyn ReferralDirectory>,
    tiers: Arc<TierEngine>,
    upgrade_on_registration: bool,
}

impl ReferralLinker {
    pub fn new(
        directory: Arc<dyn ReferralDirectory>,
        tiers: Arc<TierEngine>,
        upgrade_on_registration: bool,
    ) -> Self {
        Self {
            directory,
            tiers,
            upgrade_on_registration,
        }
    }

    /// Record a signup. Creates the user's profile if the directory has not
    /// seen it yet.
    ///
    /// Redelivery with the same code is a no-op; relinking a user to a
    /// different IB is rejected.
    pub async fn register(
        &self,
        user_id: UserId,
        referred_by: Option<&str>,
    ) -> Result<RegistrationOutcome, IbError> {
        let user = self
            .directory
            .create_user_if_absent(&IbProfile::new(user_id))
            .await?;

        let Some(code) = referred_by.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(RegistrationOutcome {
                user_id,
                parent_ib_id: user.parent_ib_id,
                tier_upgrade: None,
            });
        };
        let code = code.to_ascii_uppercase();
        let code = code.as_str();

        let recruiter = match self.directory.find_by_referral_code(code).await? {
            Some(r) if r.is_active_ib() => r,
            Some(r) => {
                warn!(
                    user_id,
                    code,
                    recruiter = r.user_id,
                    status = ?r.ib_status,
                    "Referral code owner is not an active IB, user left unlinked"
                );
                return Ok(RegistrationOutcome {
                    user_id,
                    parent_ib_id: user.parent_ib_id,
                    tier_upgrade: None,
                });
            }
            None => {
                warn!(user_id, code, "Unknown referral code, user left unlinked");
                return Ok(RegistrationOutcome {
                    user_id,
                    parent_ib_id: user.parent_ib_id,
                    tier_upgrade: None,
                });
            }
        };

        if recruiter.user_id == user_id {
            return Err(IbError::InvalidState(format!(
                "user {} cannot refer themselves",
                user_id
            )));
        }

        if let Some(parent) = user.parent_ib_id {
            return existing_link(user_id, parent, recruiter.user_id);
        }

        self.ensure_acyclic(user_id, &recruiter).await?;

        let linked = self
            .directory
            .link_parent(user_id, recruiter.user_id, code)
            .await?;
        if linked.is_none() {
            // a concurrent registration linked the user first
            let parent = self.directory.require_user(user_id).await?.parent_ib_id;
            if let Some(parent) = parent {
                return existing_link(user_id, parent, recruiter.user_id);
            }
        }
        info!(user_id, parent_ib_id = recruiter.user_id, code, "Referral linked");

        // the link is committed; a failed tier check must not undo it
        let tier_upgrade = if self.upgrade_on_registration {
            match self.tiers.check_and_upgrade(recruiter.user_id).await {
                Ok(upgrade) => upgrade,
                Err(e) => {
                    warn!(
                        user_id,
                        ib_user_id = recruiter.user_id,
                        error = %e,
                        "Recruiter tier check failed after linking"
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(RegistrationOutcome {
            user_id,
            parent_ib_id: Some(recruiter.user_id),
            tier_upgrade,
        })
    }

    /// Walk the recruiter's ancestry; linking is refused if it reaches
    /// `user_id`.
    async fn ensure_acyclic(&self, user_id: UserId, recruiter: &IbProfile) -> Result<(), IbError> {
        let mut visited = FxHashSet::default();
        visited.insert(recruiter.user_id);
        let mut next = recruiter.parent_ib_id;

        while let Some(id) = next {
            if id == user_id {
                return Err(IbError::InvalidState(format!(
                    "linking user {} under IB {} would create a referral cycle",
                    user_id, recruiter.user_id
                )));
            }
            if !visited.insert(id) {
                return Err(IbError::CyclicChain(id));
            }
            next = match self.directory.get_user(id).await? {
                Some(ancestor) => ancestor.parent_ib_id,
                None => None,
            };
        }
        Ok(())
    }
}

/// Redelivery to the same parent is a no-op; any other parent is a relink.
fn existing_link(
    user_id: UserId,
    parent: UserId,
    recruiter: UserId,
) -> Result<RegistrationOutcome, IbError> {
    if parent != recruiter {
        return Err(IbError::InvalidState(format!(
            "user {} is already linked to IB {}",
            user_id, parent
        )));
    }
    Ok(RegistrationOutcome {
        user_id,
        parent_ib_id: Some(parent),
        tier_upgrade: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::IbStatus;
    use crate::plan::{CommissionPlan, CommissionType, PlanRegistry, Tier, default_tier_ladder};
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    fn linker(store: &Arc<MemoryStore>, upgrade: bool) -> ReferralLinker {
        linker_with_ladder(store, upgrade, default_tier_ladder())
    }

    fn linker_with_ladder(
        store: &Arc<MemoryStore>,
        upgrade: bool,
        ladder: Vec<Tier>,
    ) -> ReferralLinker {
        let plans = Arc::new(PlanRegistry::new(
            store.clone(),
            CommissionPlan::from_rates("Default", CommissionType::PerLot, &[Decimal::ONE]),
            ladder,
        ));
        let tiers = Arc::new(TierEngine::new(store.clone(), plans));
        ReferralLinker::new(store.clone(), tiers, upgrade)
    }

    async fn ib(store: &MemoryStore, id: UserId, code: &str, parent: Option<UserId>) {
        let mut p = IbProfile::new(id);
        p.is_ib = true;
        p.ib_status = Some(IbStatus::Active);
        p.referral_code = Some(code.to_string());
        p.parent_ib_id = parent;
        p.ib_level_order = Some(1);
        store.save_profile(&p).await.unwrap();
    }

    #[tokio::test]
    async fn test_links_to_active_ib() {
        let store = Arc::new(MemoryStore::new());
        ib(&store, 1, "ALPHA234", None).await;
        let linker = linker(&store, false);

        let out = linker.register(10, Some("ALPHA234")).await.unwrap();
        assert_eq!(out.parent_ib_id, Some(1));
        assert!(out.tier_upgrade.is_none());

        let user = store.get_user(10).await.unwrap().unwrap();
        assert_eq!(user.parent_ib_id, Some(1));
        assert_eq!(user.referred_by.as_deref(), Some("ALPHA234"));

        // redelivery is a no-op
        let again = linker.register(10, Some("ALPHA234")).await.unwrap();
        assert_eq!(again.parent_ib_id, Some(1));
    }

    #[tokio::test]
    async fn test_unknown_or_inactive_code_leaves_unlinked() {
        let store = Arc::new(MemoryStore::new());
        let mut blocked = IbProfile::new(2);
        blocked.is_ib = true;
        blocked.ib_status = Some(IbStatus::Blocked);
        blocked.referral_code = Some("BLOCKED2".to_string());
        store.save_profile(&blocked).await.unwrap();
        let linker = linker(&store, false);

        let out = linker.register(10, Some("NOPE9999")).await.unwrap();
        assert_eq!(out.parent_ib_id, None);
        let out = linker.register(11, Some("BLOCKED2")).await.unwrap();
        assert_eq!(out.parent_ib_id, None);
        let out = linker.register(12, None).await.unwrap();
        assert_eq!(out.parent_ib_id, None);

        assert!(store.get_user(10).await.unwrap().is_some());
        assert!(store.get_user(12).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rejects_self_relink_and_cycles() {
        let store = Arc::new(MemoryStore::new());
        ib(&store, 1, "ROOT2345", None).await;
        ib(&store, 2, "CHILD234", Some(1)).await;
        ib(&store, 3, "OTHER234", None).await;
        let linker = linker(&store, false);

        let err = linker.register(1, Some("ROOT2345")).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");

        // 1 is unlinked; putting it under its own descendant closes a loop
        let err = linker.register(1, Some("CHILD234")).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        assert_eq!(store.get_user(1).await.unwrap().unwrap().parent_ib_id, None);

        let err = linker.register(2, Some("OTHER234")).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_registration_triggers_upgrade() {
        let store = Arc::new(MemoryStore::new());
        ib(&store, 1, "GROW2345", None).await;
        let linker = linker(&store, true);

        let mut last = None;
        for uid in 100..105 {
            last = linker.register(uid, Some("GROW2345")).await.unwrap().tier_upgrade;
        }
        let up = last.unwrap();
        assert!(up.upgraded);
        assert_eq!(up.new_level.name, "Silver");
        assert_eq!(store.get_user(1).await.unwrap().unwrap().tier_order(), 2);
    }

    #[tokio::test]
    async fn test_failed_tier_check_keeps_link() {
        let store = Arc::new(MemoryStore::new());
        ib(&store, 1, "LINK2345", None).await;
        // no stored tiers and an empty fallback ladder: every tier check errors
        let linker = linker_with_ladder(&store, true, Vec::new());

        let out = linker.register(10, Some("LINK2345")).await.unwrap();
        assert_eq!(out.parent_ib_id, Some(1));
        assert!(out.tier_upgrade.is_none());
        assert_eq!(store.get_user(10).await.unwrap().unwrap().parent_ib_id, Some(1));

        // redelivery still reports the link
        let again = linker.register(10, Some("LINK2345")).await.unwrap();
        assert_eq!(again.parent_ib_id, Some(1));
    }
}
