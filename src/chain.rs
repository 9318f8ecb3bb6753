//! Chain Resolver
//!
//! Walks `parent_ib_id` links from a trader up to `max_depth` active IB
//! ancestors. The walk stops quietly at the first missing, non-IB or
//! inactive ancestor (a partial chain just pays fewer levels) and fails
//! hard with `CyclicChain` if it ever meets an id twice.

use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::{debug, error};

use crate::core_types::UserId;
use crate::directory::{IbProfile, ReferralDirectory};
use crate::error::IbError;

/// One paying ancestor. `level` 1 is the trader's direct recruiter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainLink {
    pub ib: IbProfile,
    pub level: u32,
}

pub struct ChainResolver {
    directory: Arc<dyn ReferralDirectory>,
}

impl ChainResolver {
    pub fn new(directory: Arc<dyn ReferralDirectory>) -> Self {
        Self { directory }
    }

    /// Ancestors in strictly increasing level order.
    ///
    /// Empty when the trader has no parent or the first parent is inactive.
    pub async fn resolve(
        &self,
        trader_id: UserId,
        max_depth: u32,
    ) -> Result<Vec<ChainLink>, IbError> {
        let trader = self.directory.require_user(trader_id).await?;

        let mut chain = Vec::new();
        let mut visited = FxHashSet::default();
        visited.insert(trader_id);

        let mut next = trader.parent_ib_id;
        let mut level = 1;

        while level <= max_depth {
            let Some(ancestor_id) = next else {
                break;
            };

            if !visited.insert(ancestor_id) {
                error!(
                    trader_id,
                    ancestor_id,
                    level,
                    "Referral chain loops back, aborting walk"
                );
                return Err(IbError::CyclicChain(ancestor_id));
            }

            let Some(ancestor) = self.directory.get_user(ancestor_id).await? else {
                debug!(trader_id, ancestor_id, level, "Ancestor missing, chain ends");
                break;
            };

            if !ancestor.is_active_ib() {
                debug!(
                    trader_id,
                    ancestor_id,
                    level,
                    status = ?ancestor.ib_status,
                    "Ancestor not an active IB, chain ends"
                );
                break;
            }

            next = ancestor.parent_ib_id;
            chain.push(ChainLink {
                ib: ancestor,
                level,
            });
            level += 1;
        }

        Ok(chain)
    }
}
