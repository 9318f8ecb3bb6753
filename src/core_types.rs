//! Core types used throughout the engine
//!
//! Identifiers are plain integer aliases, matching how the user directory
//! and the trade engine hand them to us.

/// User ID - globally unique, immutable after assignment.
///
/// Both traders and IBs are users; an IB is a user with `is_ib` set.
pub type UserId = u64;

/// Trade ID - unique per closed trade, emitted by the trade engine.
pub type TradeId = u64;

/// Commission plan ID
pub type PlanId = u64;

/// Tier (IB level) ID
pub type TierId = u64;

/// Deepest commission chain any plan may pay.
pub const MAX_COMMISSION_LEVELS: u32 = 5;
