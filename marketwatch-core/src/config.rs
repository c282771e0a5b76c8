//! Job configuration: which instruments to reconcile, from where, and how.
//!
//! Stored as a TOML file:
//!
//! ```toml
//! database = "marketwatch.db"
//! lookback_hours = 48
//!
//! [source]
//! kind = "coinbase"
//!
//! [policy]
//! kind = "single_slot_poll"
//! max_attempts = 5
//! retry_delay_secs = 30
//!
//! [[instruments]]
//! symbol = "BTC-EUR"
//! category = "CRYPTO"
//! interval = "1h"
//! ```
//!
//! Every key is optional; missing keys take the defaults below.

use crate::domain::{AssetCategory, InstrumentId, Interval};
use crate::reconcile::policy::{
    BackfillPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_SPAN_DAYS, DEFAULT_PAGE_DELAY,
    DEFAULT_PAGE_LIMIT, DEFAULT_RETRY_DELAY,
};
use crate::reconcile::ReconcileRequest;
use crate::upstream::SourceKind;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_LOOKBACK_HOURS: i64 = 48;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Window length ending now.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

fn default_database() -> PathBuf {
    PathBuf::from("marketwatch.db")
}

fn default_lookback_hours() -> i64 {
    DEFAULT_LOOKBACK_HOURS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Coinbase,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    SingleSlotPoll,
    PaginatedBackfill,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub kind: PolicyKind,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub page_limit: usize,
    pub max_span_days: i64,
    pub page_delay_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kind: PolicyKind::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_secs: DEFAULT_RETRY_DELAY.as_secs(),
            page_limit: DEFAULT_PAGE_LIMIT,
            max_span_days: DEFAULT_MAX_SPAN_DAYS,
            page_delay_ms: DEFAULT_PAGE_DELAY.as_millis() as u64,
        }
    }
}

impl PolicyConfig {
    pub fn backfill_policy(&self) -> BackfillPolicy {
        match self.kind {
            PolicyKind::SingleSlotPoll => BackfillPolicy::SingleSlotPoll,
            PolicyKind::PaginatedBackfill => BackfillPolicy::PaginatedBackfill {
                page_limit: self.page_limit,
                max_span: Duration::days(self.max_span_days),
                page_delay: std::time::Duration::from_millis(self.page_delay_ms),
            },
        }
    }

    pub fn retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.retry_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,

    #[serde(default = "default_category")]
    pub category: AssetCategory,

    #[serde(default = "default_interval")]
    pub interval: Interval,
}

fn default_category() -> AssetCategory {
    AssetCategory::Crypto
}

fn default_interval() -> Interval {
    Interval::HOUR
}

impl InstrumentConfig {
    pub fn new(symbol: impl Into<String>, category: AssetCategory, interval: Interval) -> Self {
        Self {
            symbol: symbol.into(),
            category,
            interval,
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            lookback_hours: DEFAULT_LOOKBACK_HOURS,
            source: SourceConfig::default(),
            policy: PolicyConfig::default(),
            instruments: Vec::new(),
        }
    }
}

impl JobConfig {
    /// Load a job from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a job from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookback_hours <= 0 {
            return Err(ConfigError::Invalid(format!(
                "lookback_hours must be positive, got {}",
                self.lookback_hours
            )));
        }
        if self.policy.page_limit == 0 {
            return Err(ConfigError::Invalid("policy.page_limit must be at least 1".into()));
        }
        if self.policy.max_span_days <= 0 {
            return Err(ConfigError::Invalid("policy.max_span_days must be positive".into()));
        }
        if let Some(blank) = self.instruments.iter().find(|i| i.symbol.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "instrument with empty symbol ({} {})",
                blank.category, blank.interval
            )));
        }
        Ok(())
    }

    /// `[now - lookback_hours, now]`.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - Duration::hours(self.lookback_hours), now)
    }

    /// Reconcile request for one configured instrument, resolved to `id`.
    pub fn request_for(
        &self,
        id: InstrumentId,
        instrument: &InstrumentConfig,
        now: DateTime<Utc>,
    ) -> ReconcileRequest {
        let (start, end) = self.window(now);
        ReconcileRequest::new(id, instrument.symbol.clone(), start, end, instrument.interval)
            .with_policy(self.policy.backfill_policy())
            .with_retry(self.policy.max_attempts, self.policy.retry_delay())
    }
}
