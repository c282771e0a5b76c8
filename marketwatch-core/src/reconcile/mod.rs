//! Gap reconciliation: compare stored observations against the expected
//! grid, then backfill the holes from an upstream source.
//!
//! Stages, per instrument:
//! 1. [`grid::expected_grid`] lays out every slot the window should hold.
//! 2. [`existing::load_existing`] reads which slots are already stored.
//! 3. [`gaps::extract_gaps`] collapses the difference into [`MissingRange`]s.
//! 4. [`backfill::Backfill`] fetches and upserts each range under the
//!    configured [`BackfillPolicy`].
//!
//! [`MissingRange`]: crate::domain::MissingRange

pub mod backfill;
pub mod batch;
pub mod existing;
pub mod gaps;
pub mod grid;
pub mod policy;
pub mod reconciler;

pub use backfill::{Backfill, RangeOutcome};
pub use batch::{reconcile_all, BatchSummary, ReconcileProgress, TracingProgress};
pub use existing::load_existing;
pub use gaps::{collapse_ranges, extract_gaps, missing_slots};
pub use grid::expected_grid;
pub use policy::BackfillPolicy;
pub use reconciler::{plan_gaps, ReconcileReport, ReconcileRequest, Reconciler};

use crate::storage::StorageError;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Blocking pause between upstream requests.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}
