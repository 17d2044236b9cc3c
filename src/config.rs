//! Whale Watch Configuration
//!
//! One validated structure for every knob the ingestion engine uses.
//! Loaded from TOML, overridden from the CLI/environment, validated once at
//! startup before any network call is made.

use crate::models::Tier;
use crate::scrapers::SchemaVersion;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str =
    "https://api.goldsky.com/api/public/project_cl6mb8i9h0003e201j6li0diw/subgraphs/polymarket/prod/gn";
pub const DEFAULT_CONFIG_PATH: &str = "whale_watch.toml";

/// Subgraph `first:` argument is capped upstream
pub const MAX_PAGE_SIZE: u32 = 1000;
pub const MAX_PAGE_DELAY_MS: u64 = 10_000;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 120;
/// Upper bound for day-denominated windows; keeps second arithmetic far from overflow
pub const MAX_WINDOW_DAYS: i64 = 3_650;
pub const MAX_POLL_WINDOW_MINUTES: i64 = 7 * 24 * 60;

const SECS_PER_DAY: i64 = 86_400;
const SECS_PER_MINUTE: i64 = 60;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub feed: FeedConfig,

    /// Trades below this notional are dropped before merge
    pub min_usd_threshold: Decimal,

    /// Tier table; strictly increasing in both tier and threshold
    pub tiers: Vec<TierThreshold>,

    pub retention_days: i64,
    pub max_store_size: usize,

    /// Backfill page size
    pub page_size: u32,
    /// Incremental poll page size; should cover a full poll window of volume
    pub poll_page_size: u32,

    pub poll_window_minutes: i64,
    pub backfill_window_days: i64,

    /// Hard stop for the backfill cursor loop
    pub max_iterations: u32,
    /// Pause between backfill pages
    pub page_delay_ms: u64,

    pub store: StoreConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            min_usd_threshold: Decimal::from(1_000),
            tiers: vec![
                TierThreshold::new(Tier::Shark, 1_000),
                TierThreshold::new(Tier::Whale, 10_000),
                TierThreshold::new(Tier::Leviathan, 50_000),
            ],
            retention_days: 30,
            max_store_size: 2_000,
            page_size: 1_000,
            poll_page_size: 1_000,
            poll_window_minutes: 60,
            backfill_window_days: 30,
            max_iterations: 200,
            page_delay_ms: 250,
            store: StoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub endpoint: String,
    pub schema: SchemaVersion,
    pub request_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            schema: SchemaVersion::Deal,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub backend: StoreBackend,
    /// Raw seed records applied only when the loaded store is empty
    pub bootstrap_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/whales.json"),
            backend: StoreBackend::Json,
            bootstrap_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThreshold {
    pub tier: Tier,
    pub min_usd: Decimal,
}

impl TierThreshold {
    pub fn new(tier: Tier, min_usd: i64) -> Self {
        Self {
            tier,
            min_usd: Decimal::from(min_usd),
        }
    }
}

impl WatchConfig {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Unreadable(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&contents)
            .map_err(|e| ConfigError::Unreadable(format!("{}: {}", path.display(), e)))
    }

    /// Resolve the config file: an explicit path must load; the default path
    /// falls back to built-in defaults when absent.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => {
                tracing::debug!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.feed.endpoint.starts_with("http://") || self.feed.endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidEndpoint(self.feed.endpoint.clone()));
        }
        if self.feed.request_timeout_secs == 0
            || self.feed.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS
        {
            return Err(ConfigError::OutOfRange {
                field: "feed.request_timeout_secs",
                value: self.feed.request_timeout_secs.to_string(),
            });
        }

        if self.min_usd_threshold.is_sign_negative() {
            return Err(ConfigError::OutOfRange {
                field: "min_usd_threshold",
                value: self.min_usd_threshold.to_string(),
            });
        }
        validate_tiers(&self.tiers)?;

        for (field, value, max) in [
            ("retention_days", self.retention_days, MAX_WINDOW_DAYS),
            ("backfill_window_days", self.backfill_window_days, MAX_WINDOW_DAYS),
            ("poll_window_minutes", self.poll_window_minutes, MAX_POLL_WINDOW_MINUTES),
        ] {
            if value <= 0 {
                return Err(ConfigError::NonPositiveWindow { field, value });
            }
            if value > max {
                return Err(ConfigError::OutOfRange {
                    field,
                    value: value.to_string(),
                });
            }
        }

        for (field, value) in [
            ("page_size", self.page_size),
            ("poll_page_size", self.poll_page_size),
        ] {
            if value == 0 || value > MAX_PAGE_SIZE {
                return Err(ConfigError::OutOfRange {
                    field,
                    value: value.to_string(),
                });
            }
        }

        if self.max_store_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_store_size",
                value: "0".into(),
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_iterations",
                value: "0".into(),
            });
        }
        if self.page_delay_ms > MAX_PAGE_DELAY_MS {
            return Err(ConfigError::OutOfRange {
                field: "page_delay_ms",
                value: self.page_delay_ms.to_string(),
            });
        }

        if self.backfill_window_days > self.retention_days {
            tracing::warn!(
                "backfill window ({}d) exceeds retention ({}d); older trades will be pruned on arrival",
                self.backfill_window_days,
                self.retention_days
            );
        }

        Ok(())
    }

    pub fn retention_secs(&self) -> i64 {
        self.retention_days * SECS_PER_DAY
    }

    pub fn backfill_window_secs(&self) -> i64 {
        self.backfill_window_days * SECS_PER_DAY
    }

    pub fn poll_window_secs(&self) -> i64 {
        self.poll_window_minutes * SECS_PER_MINUTE
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.feed.request_timeout_secs)
    }
}

fn validate_tiers(tiers: &[TierThreshold]) -> Result<(), ConfigError> {
    if tiers.is_empty() {
        return Err(ConfigError::InvalidTiers("tier table is empty".into()));
    }
    if let Some(t) = tiers.iter().find(|t| t.tier == Tier::Minnow) {
        return Err(ConfigError::InvalidTiers(format!(
            "{} is the floor tier and cannot carry a threshold (got {})",
            t.tier, t.min_usd
        )));
    }
    if let Some(t) = tiers.iter().find(|t| t.min_usd.is_sign_negative()) {
        return Err(ConfigError::InvalidTiers(format!(
            "{} threshold is negative ({})",
            t.tier, t.min_usd
        )));
    }

    let mut sorted = tiers.to_vec();
    sorted.sort_by_key(|t| t.tier);
    for pair in sorted.windows(2) {
        let (lo, hi) = (&pair[0], &pair[1]);
        if lo.tier == hi.tier {
            return Err(ConfigError::InvalidTiers(format!("{} listed twice", lo.tier)));
        }
        if hi.min_usd <= lo.min_usd {
            return Err(ConfigError::InvalidTiers(format!(
                "thresholds must strictly increase: {} ({}) <= {} ({})",
                hi.tier, hi.min_usd, lo.tier, lo.min_usd
            )));
        }
    }
    Ok(())
}

/// Startup-time configuration failure. Always fatal.
#[derive(Debug)]
pub enum ConfigError {
    Unreadable(String),
    InvalidEndpoint(String),
    InvalidTiers(String),
    NonPositiveWindow { field: &'static str, value: i64 },
    OutOfRange { field: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable(e) => write!(f, "Cannot read config: {}", e),
            Self::InvalidEndpoint(url) => write!(f, "Feed endpoint is not an http(s) URL: {}", url),
            Self::InvalidTiers(reason) => write!(f, "Invalid tier table: {}", reason),
            Self::NonPositiveWindow { field, value } => {
                write!(f, "{} must be positive, got {}", field, value)
            }
            Self::OutOfRange { field, value } => write!(f, "{} out of range: {}", field, value),
        }
    }
}

impl std::error::Error for ConfigError {}
