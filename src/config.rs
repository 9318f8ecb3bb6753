use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::commission::calculator::DEFAULT_AMOUNT_SCALE;
use crate::core_types::MAX_COMMISSION_LEVELS;
use crate::plan::{CommissionPlan, CommissionType, Tier, default_tier_ladder, validate_ladder};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Mirror file output to stderr (stdout carries replay results)
    #[serde(default = "default_true")]
    pub log_console: bool,
    #[serde(default)]
    pub commission: CommissionConfig,
    #[serde(default)]
    pub tiers: TierConfig,
    /// PostgreSQL URL; the in-memory store is used when absent
    #[serde(default)]
    pub postgres_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommissionConfig {
    /// Ancestors walked per trade (1..=5)
    pub max_depth: u32,
    /// Decimal places commission amounts are rounded to
    pub amount_scale: u32,
    /// Symbol → contract size, overriding the built-in table
    #[serde(default)]
    pub contract_sizes: HashMap<String, Decimal>,
    #[serde(default)]
    pub default_plan: DefaultPlanConfig,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            max_depth: MAX_COMMISSION_LEVELS,
            amount_scale: DEFAULT_AMOUNT_SCALE,
            contract_sizes: HashMap::new(),
            default_plan: DefaultPlanConfig::default(),
        }
    }
}

/// Plan created the first time no default plan exists
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DefaultPlanConfig {
    pub name: String,
    pub commission_type: CommissionType,
    /// Rate per level, level 1 first
    pub rates: Vec<Decimal>,
}

impl Default for DefaultPlanConfig {
    fn default() -> Self {
        Self {
            name: "Standard".to_string(),
            commission_type: CommissionType::PerLot,
            rates: vec![Decimal::from(5), Decimal::from(3), Decimal::from(1)],
        }
    }
}

impl DefaultPlanConfig {
    pub fn to_plan(&self) -> CommissionPlan {
        let mut plan = CommissionPlan::from_rates(&self.name, self.commission_type, &self.rates);
        plan.is_default = true;
        plan
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TierConfig {
    /// Re-check the recruiter's tier after each linked signup
    pub auto_upgrade_on_registration: bool,
    /// Replaces the built-in ladder when the tier store is empty
    #[serde(default)]
    pub ladder: Option<Vec<Tier>>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            auto_upgrade_on_registration: true,
            ladder: None,
        }
    }
}

impl TierConfig {
    pub fn ladder(&self) -> Vec<Tier> {
        self.ladder.clone().unwrap_or_else(default_tier_ladder)
    }
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        Self::from_file(format!("config/{}.yaml", env))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.commission;
        if c.max_depth == 0 || c.max_depth > MAX_COMMISSION_LEVELS {
            return Err(ConfigError::Invalid(format!(
                "commission.max_depth must be within 1..={}, got {}",
                MAX_COMMISSION_LEVELS, c.max_depth
            )));
        }
        if c.amount_scale > 18 {
            return Err(ConfigError::Invalid(format!(
                "commission.amount_scale must be at most 18, got {}",
                c.amount_scale
            )));
        }
        if let Some((symbol, size)) = c.contract_sizes.iter().find(|(_, v)| **v <= Decimal::ZERO) {
            return Err(ConfigError::Invalid(format!(
                "contract size for {} must be positive, got {}",
                symbol, size
            )));
        }

        c.default_plan
            .to_plan()
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("commission.default_plan: {}", e)))?;

        if let Some(ladder) = &self.tiers.ladder {
            validate_ladder(ladder)
                .map_err(|e| ConfigError::Invalid(format!("tiers.ladder: {}", e)))?;
        }
        Ok(())
    }
}
