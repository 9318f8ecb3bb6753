//! PostgreSQL schema
//!
//! Idempotent DDL, applied in order by [`init_schema`]. Money columns are
//! unconstrained NUMERIC so stored values keep the scale they were computed
//! with.

use sqlx::PgPool;

pub const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS ib_users_tb (
    user_id              BIGINT PRIMARY KEY,
    is_ib                BOOLEAN NOT NULL DEFAULT FALSE,
    ib_status            TEXT,
    referral_code        TEXT UNIQUE,
    referred_by          TEXT,
    parent_ib_id         BIGINT,
    ib_plan_id           BIGINT,
    ib_level_id          BIGINT,
    ib_level_order       INTEGER,
    auto_upgrade_enabled BOOLEAN NOT NULL DEFAULT TRUE,
    blocked_reason       TEXT,
    created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_USERS_PARENT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_ib_users_parent ON ib_users_tb (parent_ib_id)";

pub const CREATE_PLANS: &str = r#"
CREATE TABLE IF NOT EXISTS ib_plans_tb (
    plan_id         BIGSERIAL PRIMARY KEY,
    name            TEXT NOT NULL,
    is_default      BOOLEAN NOT NULL DEFAULT FALSE,
    max_levels      INTEGER NOT NULL,
    commission_type TEXT NOT NULL,
    levels          JSONB NOT NULL,
    sources         JSONB NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// At most one default plan
pub const CREATE_PLANS_DEFAULT_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS idx_ib_plans_default ON ib_plans_tb (is_default) WHERE is_default";

pub const CREATE_TIERS: &str = r#"
CREATE TABLE IF NOT EXISTS ib_tiers_tb (
    tier_id             BIGSERIAL PRIMARY KEY,
    name                TEXT NOT NULL,
    tier_order          INTEGER NOT NULL UNIQUE,
    referral_target     BIGINT NOT NULL,
    commission_rate     NUMERIC NOT NULL,
    commission_type     TEXT NOT NULL,
    downline_commission JSONB NOT NULL
)
"#;

pub const CREATE_WALLETS: &str = r#"
CREATE TABLE IF NOT EXISTS ib_wallets_tb (
    ib_user_id          BIGINT PRIMARY KEY,
    balance             NUMERIC NOT NULL DEFAULT 0 CHECK (balance >= 0),
    total_earned        NUMERIC NOT NULL DEFAULT 0 CHECK (total_earned >= 0),
    total_withdrawn     NUMERIC NOT NULL DEFAULT 0 CHECK (total_withdrawn >= 0),
    pending_withdrawal  NUMERIC NOT NULL DEFAULT 0 CHECK (pending_withdrawal >= 0),
    reconciliation_debt NUMERIC NOT NULL DEFAULT 0 CHECK (reconciliation_debt >= 0),
    last_updated        TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Append-only journal of wallet mutations
pub const CREATE_WALLET_OPS: &str = r#"
CREATE TABLE IF NOT EXISTS ib_wallet_ops_tb (
    id            BIGSERIAL PRIMARY KEY,
    ib_user_id    BIGINT NOT NULL,
    op            TEXT NOT NULL,
    amount        NUMERIC NOT NULL,
    balance_after NUMERIC NOT NULL,
    commission_id TEXT,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_COMMISSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS ib_commissions_tb (
    commission_id     TEXT PRIMARY KEY,
    trade_id          BIGINT NOT NULL,
    trader_user_id    BIGINT NOT NULL,
    ib_user_id        BIGINT NOT NULL,
    level             INTEGER NOT NULL,
    base_amount       NUMERIC NOT NULL,
    commission_amount NUMERIC NOT NULL,
    symbol            TEXT NOT NULL,
    trade_lot_size    NUMERIC NOT NULL,
    contract_size     NUMERIC NOT NULL,
    open_price        NUMERIC NOT NULL,
    rate              NUMERIC NOT NULL,
    commission_type   TEXT NOT NULL,
    status            TEXT NOT NULL,
    created_at        TIMESTAMPTZ NOT NULL,
    reversed_at       TIMESTAMPTZ,
    reversed_by       BIGINT,
    reversal_reason   TEXT,
    UNIQUE (trade_id, ib_user_id, level)
)
"#;

pub const CREATE_COMMISSIONS_IB_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_ib_commissions_ib ON ib_commissions_tb (ib_user_id, created_at DESC)";

/// Outbox of main-wallet credits; `reference` dedupes redelivery
pub const CREATE_MAIN_WALLET_CREDITS: &str = r#"
CREATE TABLE IF NOT EXISTS ib_main_wallet_credits_tb (
    reference  TEXT PRIMARY KEY,
    user_id    BIGINT NOT NULL,
    amount     NUMERIC NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const ALL: &[&str] = &[
    CREATE_USERS,
    CREATE_USERS_PARENT_INDEX,
    CREATE_PLANS,
    CREATE_PLANS_DEFAULT_INDEX,
    CREATE_TIERS,
    CREATE_WALLETS,
    CREATE_WALLET_OPS,
    CREATE_COMMISSIONS,
    CREATE_COMMISSIONS_IB_INDEX,
    CREATE_MAIN_WALLET_CREDITS,
];

pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for ddl in ALL {
        sqlx::query(ddl).execute(pool).await?;
    }
    tracing::info!(statements = ALL.len(), "IB schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddl_is_idempotent() {
        for ddl in ALL {
            assert!(ddl.contains("IF NOT EXISTS"), "not idempotent: {}", ddl);
        }
    }

    #[test]
    fn test_commission_key_is_unique() {
        assert!(CREATE_COMMISSIONS.contains("UNIQUE (trade_id, ib_user_id, level)"));
    }
}
