//! Plan & Level Store
//!
//! Commission plans (rate per chain level, payout model) and the tier
//! ladder. Read-mostly; admins mutate plans through [`PlanRegistry`], which
//! validates before anything reaches the store.

pub mod models;

pub use models::{
    CommissionPlan, CommissionSources, CommissionType, LevelRate, Tier, default_tier_ladder,
    validate_ladder,
};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core_types::PlanId;
use crate::directory::IbProfile;
use crate::error::IbError;

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn get_plan(&self, plan_id: PlanId) -> Result<Option<CommissionPlan>, IbError>;

    async fn get_default_plan(&self) -> Result<Option<CommissionPlan>, IbError>;

    /// Insert (`plan_id == 0`) or replace a plan; returns it with its id.
    async fn save_plan(&self, plan: CommissionPlan) -> Result<CommissionPlan, IbError>;

    /// Insert `plan` as the default unless one exists. Returns the default
    /// either way; concurrent callers all observe the same plan.
    async fn ensure_default_plan(
        &self,
        plan: CommissionPlan,
    ) -> Result<CommissionPlan, IbError>;

    /// All tiers, ascending by `order`
    async fn list_tiers(&self) -> Result<Vec<Tier>, IbError>;

    /// Insert `ladder` only if no tier exists yet; returns the stored ladder.
    async fn insert_tiers_if_empty(&self, ladder: Vec<Tier>) -> Result<Vec<Tier>, IbError>;
}

/// Plan resolution and admin mutation on top of a [`PlanStore`]
pub struct PlanRegistry {
    store: Arc<dyn PlanStore>,
    default_plan: CommissionPlan,
    default_ladder: Vec<Tier>,
}

impl PlanRegistry {
    pub fn new(
        store: Arc<dyn PlanStore>,
        default_plan: CommissionPlan,
        default_ladder: Vec<Tier>,
    ) -> Self {
        Self {
            store,
            default_plan,
            default_ladder,
        }
    }

    /// System default plan, created once from configuration if missing
    pub async fn default_plan(&self) -> Result<CommissionPlan, IbError> {
        if let Some(plan) = self.store.get_default_plan().await? {
            return Ok(plan);
        }

        let mut template = self.default_plan.clone();
        template.is_default = true;
        template.validate()?;
        let plan = self.store.ensure_default_plan(template).await?;
        info!(plan_id = plan.plan_id, name = %plan.name, "Default commission plan created");
        Ok(plan)
    }

    /// Plan assigned to the IB, falling back to the default plan
    pub async fn plan_for(&self, ib: &IbProfile) -> Result<CommissionPlan, IbError> {
        if let Some(plan_id) = ib.ib_plan_id {
            match self.store.get_plan(plan_id).await? {
                Some(plan) => return Ok(plan),
                None => warn!(
                    ib_user_id = ib.user_id,
                    plan_id, "Assigned plan missing, using default plan"
                ),
            }
        }
        self.default_plan().await
    }

    pub async fn get_plan(&self, plan_id: PlanId) -> Result<CommissionPlan, IbError> {
        self.store
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| IbError::not_found("plan", plan_id))
    }

    /// Validate and persist an admin-edited plan
    pub async fn save_plan(&self, plan: CommissionPlan) -> Result<CommissionPlan, IbError> {
        plan.validate()?;
        let saved = self.store.save_plan(plan).await?;
        info!(plan_id = saved.plan_id, name = %saved.name, "Commission plan saved");
        Ok(saved)
    }

    /// Tier ladder, bootstrapping the default ladder into an empty store
    pub async fn tiers(&self) -> Result<Vec<Tier>, IbError> {
        let tiers = self.store.list_tiers().await?;
        if !tiers.is_empty() {
            return Ok(tiers);
        }

        validate_ladder(&self.default_ladder)?;
        let tiers = self
            .store
            .insert_tiers_if_empty(self.default_ladder.clone())
            .await?;
        info!(count = tiers.len(), "Default tier ladder inserted");
        Ok(tiers)
    }

    /// Lowest tier of the ladder
    pub async fn entry_tier(&self) -> Result<Tier, IbError> {
        self.tiers()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| IbError::NotFound("tier ladder is empty".to_string()))
    }
}
