//! Reconcile entry point: one instrument, one window.

use super::backfill::{Backfill, RangeOutcome};
use super::existing::load_existing;
use super::gaps::extract_gaps;
use super::grid::expected_grid;
use super::policy::{BackfillPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use super::{ReconcileError, Sleeper, ThreadSleeper};
use crate::domain::{InstrumentId, Interval, MissingRange};
use crate::storage::ObservationStore;
use crate::upstream::UpstreamSource;
use chrono::{DateTime, Utc};
use std::time::Duration;

static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;

/// Missing ranges for `request`, computed from the store alone.
pub fn plan_gaps(
    store: &dyn ObservationStore,
    request: &ReconcileRequest,
) -> Result<Vec<MissingRange>, ReconcileError> {
    let grid = expected_grid(request.window_start, request.window_end, request.interval);
    if grid.is_empty() {
        return Ok(Vec::new());
    }
    let existing = load_existing(
        store,
        request.instrument_id,
        request.window_start,
        request.window_end,
        request.interval,
    )?;
    Ok(extract_gaps(
        request.instrument_id,
        &grid,
        &existing,
        request.interval,
    ))
}

/// What to reconcile and how.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileRequest {
    pub instrument_id: InstrumentId,
    /// Symbol as the upstream source knows it.
    pub symbol: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub interval: Interval,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub policy: BackfillPolicy,
}

impl ReconcileRequest {
    pub fn new(
        instrument_id: InstrumentId,
        symbol: impl Into<String>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        interval: Interval,
    ) -> Self {
        Self {
            instrument_id,
            symbol: symbol.into(),
            window_start,
            window_end,
            interval,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            policy: BackfillPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BackfillPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_delay = retry_delay;
        self
    }

    fn validate(&self) -> Result<(), ReconcileError> {
        if self.symbol.trim().is_empty() {
            return Err(ReconcileError::InvalidRequest(format!(
                "instrument {} has an empty symbol",
                self.instrument_id
            )));
        }
        if let BackfillPolicy::PaginatedBackfill {
            page_limit,
            max_span,
            ..
        } = &self.policy
        {
            if *page_limit == 0 {
                return Err(ReconcileError::InvalidRequest("page_limit must be at least 1".into()));
            }
            if max_span.num_seconds() < self.interval.as_secs() {
                return Err(ReconcileError::InvalidRequest(format!(
                    "max_span must cover at least one {} slot",
                    self.interval
                )));
            }
        }
        Ok(())
    }
}

/// Result of one reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub instrument_id: InstrumentId,
    /// Gaps found before backfilling.
    pub ranges_found: Vec<MissingRange>,
    /// Slots still missing afterwards, as maximal ranges.
    pub unresolved: Vec<MissingRange>,
    /// Upserts performed.
    pub upserted: usize,
    /// Upstream requests made.
    pub attempts: u32,
}

impl ReconcileReport {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    fn absorb(&mut self, outcome: RangeOutcome) {
        self.upserted += outcome.upserted;
        self.attempts += outcome.attempts;
        self.unresolved.extend(outcome.unresolved);
    }
}

/// Finds and fills the holes in a stored series.
///
/// Holds borrowed collaborators only; the caller owns the store and the
/// source for as long as it likes.
pub struct Reconciler<'a> {
    store: &'a dyn ObservationStore,
    source: &'a dyn UpstreamSource,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn ObservationStore, source: &'a dyn UpstreamSource) -> Self {
        Self {
            store,
            source,
            sleeper: &THREAD_SLEEPER,
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Gaps in the window, without contacting upstream.
    pub fn plan(&self, request: &ReconcileRequest) -> Result<Vec<MissingRange>, ReconcileError> {
        plan_gaps(self.store, request)
    }

    /// Backfill every gap in the window.
    ///
    /// Upstream failures only leave ranges unresolved; a storage failure
    /// aborts the run.
    pub fn reconcile(&self, request: &ReconcileRequest) -> Result<ReconcileReport, ReconcileError> {
        request.validate()?;
        let ranges = self.plan(request)?;

        tracing::info!(
            instrument = %request.instrument_id,
            symbol = %request.symbol,
            interval = %request.interval,
            policy = request.policy.name(),
            ranges = ranges.len(),
            "reconciling window"
        );

        let mut report = ReconcileReport {
            instrument_id: request.instrument_id,
            ranges_found: ranges.clone(),
            unresolved: Vec::new(),
            upserted: 0,
            attempts: 0,
        };

        let backfill = Backfill::new(self.store, self.source, self.sleeper);
        for range in &ranges {
            let outcome = backfill.run(request, range)?;
            report.absorb(outcome);
        }

        if report.is_complete() {
            tracing::info!(
                instrument = %request.instrument_id,
                upserted = report.upserted,
                "window complete"
            );
        } else {
            tracing::warn!(
                instrument = %request.instrument_id,
                upserted = report.upserted,
                unresolved = report.unresolved.len(),
                "window still has gaps"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::RecordingSleeper;
    use crate::storage::MemoryStore;
    use crate::upstream::{flat_candle, ScriptedSource};
    use chrono::TimeZone;

    const ID: InstrumentId = InstrumentId(5);

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    fn request() -> ReconcileRequest {
        ReconcileRequest::new(ID, "BTC-EUR", hour(0), hour(5), Interval::HOUR)
    }

    #[test]
    fn plan_does_not_touch_upstream() {
        let store = MemoryStore::new();
        store.seed(ID, &[hour(1), hour(2), hour(4)]);
        let source = ScriptedSource::empty();

        let gaps = Reconciler::new(&store, &source).plan(&request()).unwrap();
        assert_eq!(gaps.len(), 3);
        assert_eq!(source.call_count(), 0);
    }

    #[test]
    fn plan_gaps_needs_only_the_store() {
        let store = MemoryStore::new();
        store.seed(ID, &[hour(0), hour(1), hour(5)]);

        let gaps = plan_gaps(&store, &request()).unwrap();
        assert_eq!(gaps, vec![MissingRange::new(ID, hour(2), hour(4))]);
    }

    #[test]
    fn complete_window_makes_no_requests() {
        let store = MemoryStore::new();
        store.seed(ID, &(0..6).map(hour).collect::<Vec<_>>());
        let source = ScriptedSource::empty();
        let sleeper = RecordingSleeper::new();

        let report = Reconciler::new(&store, &source)
            .with_sleeper(&sleeper)
            .reconcile(&request())
            .unwrap();
        assert!(report.is_complete());
        assert!(report.ranges_found.is_empty());
        assert_eq!(report.attempts, 0);
        assert_eq!(source.call_count(), 0);
    }

    #[test]
    fn fills_every_gap() {
        let store = MemoryStore::new();
        store.seed(ID, &[hour(1), hour(2), hour(4)]);
        let source =
            ScriptedSource::from_candles((0..6).map(|h| flat_candle(hour(h), 100.0)).collect());
        let sleeper = RecordingSleeper::new();

        let report = Reconciler::new(&store, &source)
            .with_sleeper(&sleeper)
            .reconcile(&request())
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.ranges_found.len(), 3);
        assert_eq!(report.upserted, 3);
        assert_eq!(store.stored_slots(ID).len(), 6);
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn empty_symbol_is_rejected() {
        let store = MemoryStore::new();
        let source = ScriptedSource::empty();
        let req = ReconcileRequest::new(ID, " ", hour(0), hour(5), Interval::HOUR);
        let err = Reconciler::new(&store, &source).reconcile(&req).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidRequest(_)));
    }

    #[test]
    fn storage_outage_aborts() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let source = ScriptedSource::empty();
        let err = Reconciler::new(&store, &source)
            .reconcile(&request())
            .unwrap_err();
        assert!(matches!(err, ReconcileError::StorageUnavailable(_)));
    }
}
