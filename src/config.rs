// src/config.rs
use crate::market::scheduler::{ScheduleError, ScrapeSchedule};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3030";
pub const DEFAULT_SCRAPE_CRON: &str = "0 */3 8-21 * * *";
pub const DEFAULT_SCRAPE_TIMEZONE: &str = "Europe/Istanbul";
pub const DEFAULT_MARKET_DATA_URL: &str = "http://127.0.0.1:3030";
pub const DEFAULT_MARKET_DATA_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_SAMPLE_STOCKS: &str = "THYAO,GARAN,ASELS";
pub const DEFAULT_SAMPLE_INDEXES: &str = "XU100,XU030";
pub const DEFAULT_SCYLLA_URI: &str = "127.0.0.1:9042";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

fn invalid(key: &'static str, value: &str, reason: impl fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Which route groups and background jobs this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    All,
    MarketData,
    Portfolio,
    Watchlist,
}

impl Role {
    pub fn runs_market_data(&self) -> bool {
        matches!(self, Role::All | Role::MarketData)
    }

    pub fn runs_portfolio(&self) -> bool {
        matches!(self, Role::All | Role::Portfolio)
    }

    pub fn runs_watchlist(&self) -> bool {
        matches!(self, Role::All | Role::Watchlist)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Role::All),
            "market-data" => Ok(Role::MarketData),
            "portfolio" => Ok(Role::Portfolio),
            "watchlist" => Ok(Role::Watchlist),
            other => Err(format!(
                "unknown role '{}', expected all, market-data, portfolio or watchlist",
                other
            )),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::All => "all",
            Role::MarketData => "market-data",
            Role::Portfolio => "portfolio",
            Role::Watchlist => "watchlist",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Scylla { uri: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub bind_addr: SocketAddr,
    pub stock_data_url: Option<String>,
    pub index_data_url: Option<String>,
    pub schedule: ScrapeSchedule,
    pub market_data_base_url: String,
    pub market_data_timeout: Duration,
    pub sample_stocks: Vec<String>,
    pub sample_indexes: Vec<String>,
    pub storage: StorageBackend,
}

/// Splits a comma separated symbol list, dropping blanks.
pub fn split_symbols(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Reads the process environment, after loading `.env` when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let role_value = get("APP_ROLE", "all");
        let role = role_value
            .parse::<Role>()
            .map_err(|e| invalid("APP_ROLE", &role_value, e))?;

        let bind_value = get("BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr = bind_value
            .parse::<SocketAddr>()
            .map_err(|e| invalid("BIND_ADDR", &bind_value, e))?;

        let schedule = ScrapeSchedule::new(
            &get("SCRAPE_CRON", DEFAULT_SCRAPE_CRON),
            &get("SCRAPE_TIMEZONE", DEFAULT_SCRAPE_TIMEZONE),
        )?;

        let timeout_value = get(
            "MARKET_DATA_TIMEOUT_SECS",
            &DEFAULT_MARKET_DATA_TIMEOUT_SECS.to_string(),
        );
        let timeout_secs = timeout_value
            .parse::<u64>()
            .map_err(|e| invalid("MARKET_DATA_TIMEOUT_SECS", &timeout_value, e))?;

        let storage_value = get("STORAGE", "memory");
        let storage = match storage_value.trim().to_ascii_lowercase().as_str() {
            "memory" => StorageBackend::Memory,
            "scylla" => StorageBackend::Scylla {
                uri: get("SCYLLA_URI", DEFAULT_SCYLLA_URI),
            },
            _ => return Err(invalid("STORAGE", &storage_value, "expected memory or scylla")),
        };

        Ok(Config {
            role,
            bind_addr,
            stock_data_url: lookup("STOCK_DATA_URL"),
            index_data_url: lookup("INDEX_DATA_URL"),
            schedule,
            market_data_base_url: get("MARKET_DATA_SERVICE_BASE_URL", DEFAULT_MARKET_DATA_URL),
            market_data_timeout: Duration::from_secs(timeout_secs),
            sample_stocks: split_symbols(&get("SAMPLE_STOCKS", DEFAULT_SAMPLE_STOCKS)),
            sample_indexes: split_symbols(&get("SAMPLE_INDEXES", DEFAULT_SAMPLE_INDEXES)),
            storage,
        })
    }
}
