//! Storage collaborators.
//!
//! The reconciler only sees the [`ObservationStore`] capability: it never opens
//! or closes connections. Concrete stores own their connection for their whole
//! lifetime; the caller decides when to build and drop them.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::domain::{AssetCategory, Instrument, InstrumentId, Observation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Structured error types for persistence operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("instrument not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// The row already held identical fields.
    Unchanged,
}

/// Read/merge access to stored observations.
pub trait ObservationStore {
    /// Timestamps stored for `instrument` within `[start, end]`, ascending, in
    /// the store's native precision.
    fn list_observations(
        &self,
        instrument: InstrumentId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StorageError>;

    /// Insert or update the row keyed on (instrument, timestamp).
    ///
    /// Re-applying the same observation leaves storage unchanged.
    fn upsert_observation(
        &self,
        instrument: InstrumentId,
        observation: &Observation,
    ) -> Result<UpsertOutcome, StorageError>;

    /// Full observations within `[start, end]`, ascending.
    fn load_observations(
        &self,
        instrument: InstrumentId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, StorageError>;
}

/// Outcome of the last extraction run for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractStatus {
    /// Every slot in the window is stored.
    Ok,
    /// Some ranges stayed unresolved.
    Partial,
    /// The run failed before completing.
    Error,
}

impl ExtractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractStatus::Ok => "OK",
            ExtractStatus::Partial => "PARTIAL",
            ExtractStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OK" => Some(ExtractStatus::Ok),
            "PARTIAL" => Some(ExtractStatus::Partial),
            "ERROR" => Some(ExtractStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ExtractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coverage bookkeeping kept per instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub instrument_id: InstrumentId,
    /// Earliest stored observation.
    pub date_min: Option<DateTime<Utc>>,
    /// Latest stored observation.
    pub date_max: Option<DateTime<Utc>>,
    pub status: ExtractStatus,
    pub attempted_at: DateTime<Utc>,
}

/// Instrument registry.
pub trait InstrumentStore {
    fn find_instrument(&self, symbol: &str) -> Result<Option<Instrument>, StorageError>;

    /// Look up `symbol`, creating it with `category` on first sighting.
    fn get_or_create_instrument(
        &self,
        symbol: &str,
        category: AssetCategory,
    ) -> Result<Instrument, StorageError>;

    fn list_instruments(
        &self,
        category: Option<AssetCategory>,
    ) -> Result<Vec<Instrument>, StorageError>;

    /// Correct a misresolved symbol.
    fn rename_instrument(&self, id: InstrumentId, symbol: &str) -> Result<(), StorageError>;

    /// Recompute the stored date range and record the run status.
    fn record_extraction(
        &self,
        id: InstrumentId,
        status: ExtractStatus,
        at: DateTime<Utc>,
    ) -> Result<ExtractionRecord, StorageError>;

    fn extraction(&self, id: InstrumentId) -> Result<Option<ExtractionRecord>, StorageError>;
}
