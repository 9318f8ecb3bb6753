//! IB Engine - Introducing-Broker multi-level commission engine
//!
//! Pays commission up a referral chain when a trade closes, keeps each
//! IB's wallet, and moves IBs up a tier ladder as their referrals grow.
//!
//! # Modules
//!
//! - [`directory`] - Referral Directory (user → parent IB, referral codes)
//! - [`chain`] - Chain Resolver (ordered ancestor walk)
//! - [`plan`] - Plan & Level Store (commission plans, tier ladder)
//! - [`commission`] - Commission Calculator and trade processing
//! - [`wallet`] - Wallet Ledger
//! - [`tier`] - Tier Progression Engine
//! - [`admin`] - IB lifecycle, reversals, main wallet transfers
//! - [`registration`] - referral linking at signup
//! - [`stats`] - dashboard stats and history
//! - [`service`] - event dispatch over injected stores
//! - [`store`] - in-memory and PostgreSQL stores

// Core types - must be first!
pub mod core_types;
pub mod error;

pub mod config;
pub mod logging;

pub mod contract_size;
pub mod directory;
pub mod ledger;
pub mod plan;
pub mod wallet;

pub mod chain;
pub mod commission;
pub mod tier;

pub mod admin;
pub mod events;
pub mod registration;
pub mod service;
pub mod stats;
pub mod store;


// Convenient re-exports at crate root
pub use core_types::{PlanId, TierId, TradeId, UserId};
pub use error::IbError;

pub use chain::{ChainLink, ChainResolver};
pub use commission::{
    ClosedTrade, CommissionEngine, CommissionId, CommissionOutcome, CommissionRecord,
    CommissionStatus, SkipReason, TradeCommissionSummary,
};
pub use directory::{IbProfile, IbStatus, ReferralDirectory};
pub use events::{EventOutcome, IbEvent};
pub use ledger::LedgerStore;
pub use plan::{CommissionPlan, CommissionType, PlanRegistry, PlanStore, Tier};
pub use service::{IbService, ServiceStores};
pub use store::{InMemoryMainWallet, MemoryStore, PgMainWallet, PgStore};
pub use tier::{TierEngine, TierUpgrade};
pub use wallet::{MainWalletGateway, Wallet, WalletLedger};
