//! Contract size lookup
//!
//! Units of the underlying per lot, needed by PERCENT plans to turn lots
//! into notional. Known symbols come from a table (built-ins overlaid with
//! configuration); anything else falls back to a ticker heuristic:
//! crypto-looking tickers are 1 unit per lot, everything else is a standard
//! 100,000 FX lot. The heuristic mis-sizes untabulated CFDs such as indices;
//! add them to `commission.contract_sizes` rather than changing the rule.

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use std::collections::HashMap;

/// Standard FX lot
pub const STANDARD_FX_LOT: i64 = 100_000;

/// Unit contract for crypto-looking tickers
pub const CRYPTO_UNIT: i64 = 1;

const BUILTIN_SIZES: &[(&str, i64)] = &[
    ("XAUUSD", 100),
    ("XAGUSD", 5_000),
    ("XPTUSD", 100),
    ("XPDUSD", 100),
    ("BTCUSD", 1),
    ("ETHUSD", 1),
    ("BTCUSDT", 1),
    ("ETHUSDT", 1),
];

/// Fiat and metal codes that never make a ticker crypto-looking
const NON_CRYPTO_BASES: &[&str] = &[
    "EUR", "GBP", "AUD", "NZD", "CAD", "CHF", "JPY", "CNH", "HKD", "SGD", "SEK", "NOK", "DKK",
    "PLN", "MXN", "ZAR", "TRY", "USD", "XAU", "XAG", "XPT", "XPD",
];

/// Stablecoin quotes: the pair is crypto regardless of base
const CRYPTO_QUOTES: &[&str] = &["USDT", "USDC"];

#[derive(Debug, Clone)]
pub struct ContractSizeTable {
    sizes: FxHashMap<String, Decimal>,
}

impl ContractSizeTable {
    /// Built-in table only
    pub fn builtin() -> Self {
        let sizes = BUILTIN_SIZES
            .iter()
            .map(|(symbol, size)| (symbol.to_string(), Decimal::from(*size)))
            .collect();
        Self { sizes }
    }

    /// Built-in table with `overrides` taking precedence
    pub fn with_overrides(overrides: &HashMap<String, Decimal>) -> Self {
        let mut table = Self::builtin();
        for (symbol, size) in overrides {
            table.sizes.insert(normalize_symbol(symbol), *size);
        }
        table
    }

    pub fn contract_size(&self, symbol: &str) -> Decimal {
        let key = normalize_symbol(symbol);
        match self.sizes.get(&key) {
            Some(size) => *size,
            None => heuristic_contract_size(&key),
        }
    }

    pub fn is_tabulated(&self, symbol: &str) -> bool {
        self.sizes.contains_key(&normalize_symbol(symbol))
    }
}

impl Default for ContractSizeTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Uppercase, separators removed: "btc/usd" → "BTCUSD"
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .trim()
        .chars()
        .filter(|c| !matches!(c, '/' | '-' | '_'))
        .flat_map(char::to_uppercase)
        .collect()
}

/// Fallback for untabulated symbols. Expects a normalized symbol.
pub fn heuristic_contract_size(symbol: &str) -> Decimal {
    if looks_like_crypto(symbol) {
        Decimal::from(CRYPTO_UNIT)
    } else {
        Decimal::from(STANDARD_FX_LOT)
    }
}

fn looks_like_crypto(symbol: &str) -> bool {
    if CRYPTO_QUOTES.iter().any(|q| symbol.ends_with(q)) {
        return true;
    }

    let Some(base) = symbol.strip_suffix("USD") else {
        return false;
    };

    (2..=5).contains(&base.len())
        && base.chars().all(|c| c.is_ascii_alphanumeric())
        && !NON_CRYPTO_BASES.contains(&base)
}
