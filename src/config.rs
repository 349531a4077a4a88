//! Engine configuration.
//!
//! Every knob has a default so the server starts with no environment at all;
//! `main` loads `.env` through `dotenv` before calling [`Config::from_env`].

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::time::Duration;

/// Default listen address
pub const DEFAULT_BIND: &str = "0.0.0.0:1234";

/// Default sled database directory
pub const DEFAULT_DB_PATH: &str = "data/sportsbook.db";

/// Deadline for a single submit / resolve unit of work
pub const DEFAULT_TXN_TIMEOUT_MS: u64 = 2_000;

/// Optimistic retry bound before a conflict is surfaced as transient
pub const DEFAULT_TXN_MAX_ATTEMPTS: u32 = 8;

/// Largest accepted stake per slip
pub const DEFAULT_MAX_STAKE: Decimal = dec!(10000.00);

/// Largest accepted number of selections per slip
pub const DEFAULT_MAX_SELECTIONS: usize = 20;

/// Which amount the ledger debits when a promotion inflates the stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeDebit {
    /// Debit the promotion-adjusted stake (what the frontend sends as `amountToSend`)
    Effective,
    /// Debit only what the player typed; the bonus is house money
    Raw,
}

impl StakeDebit {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "effective" => Some(StakeDebit::Effective),
            "raw" => Some(StakeDebit::Raw),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub db_path: String,
    pub txn_timeout: Duration,
    pub txn_max_attempts: u32,
    pub max_stake: Decimal,
    pub max_selections: usize,
    pub stake_debit: StakeDebit,
    /// When set, `/api/Admin/*` requires a matching `X-Admin-Token` header
    pub admin_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            db_path: DEFAULT_DB_PATH.to_string(),
            txn_timeout: Duration::from_millis(DEFAULT_TXN_TIMEOUT_MS),
            txn_max_attempts: DEFAULT_TXN_MAX_ATTEMPTS,
            max_stake: DEFAULT_MAX_STAKE,
            max_selections: DEFAULT_MAX_SELECTIONS,
            stake_debit: StakeDebit::Effective,
            admin_token: None,
        }
    }
}

impl Config {
    /// Read `SPORTSBOOK_*` variables, falling back to defaults for missing or
    /// unparseable values (the fallback is logged).
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let stake_debit = match std::env::var("SPORTSBOOK_STAKE_DEBIT") {
            Ok(raw) => StakeDebit::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "unknown SPORTSBOOK_STAKE_DEBIT, using 'effective'");
                StakeDebit::Effective
            }),
            Err(_) => defaults.stake_debit,
        };

        Self {
            bind_addr: std::env::var("SPORTSBOOK_BIND").unwrap_or(defaults.bind_addr),
            db_path: std::env::var("SPORTSBOOK_DB_PATH").unwrap_or(defaults.db_path),
            txn_timeout: Duration::from_millis(env_parse(
                "SPORTSBOOK_TXN_TIMEOUT_MS",
                DEFAULT_TXN_TIMEOUT_MS,
            )),
            txn_max_attempts: env_parse("SPORTSBOOK_TXN_MAX_ATTEMPTS", defaults.txn_max_attempts)
                .max(1),
            max_stake: env_parse("SPORTSBOOK_MAX_STAKE", defaults.max_stake),
            max_selections: env_parse("SPORTSBOOK_MAX_SELECTIONS", defaults.max_selections).max(1),
            stake_debit,
            admin_token: std::env::var("SPORTSBOOK_ADMIN_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
        }
    }

    pub fn log_status(&self) {
        tracing::info!(
            bind = %self.bind_addr,
            db = %self.db_path,
            timeout_ms = self.txn_timeout.as_millis() as u64,
            max_attempts = self.txn_max_attempts,
            max_stake = %self.max_stake,
            max_selections = self.max_selections,
            stake_debit = ?self.stake_debit,
            admin_guard = self.admin_token.is_some(),
            "configuration loaded"
        );
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparseable value, using default");
            default
        }),
        Err(_) => default,
    }
}
