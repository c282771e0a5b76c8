//! Backfill driver: fetch one missing range and upsert what arrives.

use super::gaps::collapse_ranges;
use super::policy::BackfillPolicy;
use super::reconciler::ReconcileRequest;
use super::Sleeper;
use crate::domain::{Candle, Interval, MissingRange, Observation};
use crate::storage::{ObservationStore, StorageError};
use crate::upstream::UpstreamSource;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

/// What happened to one range.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeOutcome {
    pub range: MissingRange,
    /// Upstream requests made for this range.
    pub attempts: u32,
    pub upserted: usize,
    /// Slots still missing, as maximal sub-ranges.
    pub unresolved: Vec<MissingRange>,
}

impl RangeOutcome {
    pub fn is_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }
}

pub struct Backfill<'a> {
    store: &'a dyn ObservationStore,
    source: &'a dyn UpstreamSource,
    sleeper: &'a dyn Sleeper,
}

/// `t` moved forward by `steps` slots, `None` past the representable range.
fn advance(t: DateTime<Utc>, interval: Interval, steps: i64) -> Option<DateTime<Utc>> {
    let secs = interval.as_secs().checked_mul(steps)?;
    t.checked_add_signed(Duration::try_seconds(secs)?)
}

impl<'a> Backfill<'a> {
    pub fn new(
        store: &'a dyn ObservationStore,
        source: &'a dyn UpstreamSource,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            store,
            source,
            sleeper,
        }
    }

    /// Backfill `range` under the request's policy.
    ///
    /// Upstream errors are logged and cost an attempt. Storage errors abort.
    pub fn run(
        &self,
        request: &ReconcileRequest,
        range: &MissingRange,
    ) -> Result<RangeOutcome, StorageError> {
        let mut remaining: BTreeSet<DateTime<Utc>> =
            range.slots(request.interval).into_iter().collect();

        tracing::debug!(
            instrument = %request.instrument_id,
            range_start = %range.start,
            range_end = %range.end,
            slots = remaining.len(),
            "backfilling range"
        );

        let (attempts, upserted) = match &request.policy {
            BackfillPolicy::SingleSlotPoll => self.poll(request, &mut remaining)?,
            BackfillPolicy::PaginatedBackfill {
                page_limit,
                max_span,
                page_delay,
            } => self.paginate(
                request,
                range,
                &mut remaining,
                *page_limit,
                *max_span,
                *page_delay,
            )?,
        };

        let unresolved = collapse_ranges(range.instrument_id, remaining, request.interval);
        if !unresolved.is_empty() {
            tracing::warn!(
                instrument = %request.instrument_id,
                range_start = %range.start,
                range_end = %range.end,
                attempts,
                still_missing = unresolved.len(),
                "range not fully backfilled"
            );
        }

        Ok(RangeOutcome {
            range: *range,
            attempts,
            upserted,
            unresolved,
        })
    }

    /// Upsert the candles that land on still-required slots.
    fn merge(
        &self,
        request: &ReconcileRequest,
        candles: &[Candle],
        remaining: &mut BTreeSet<DateTime<Utc>>,
    ) -> Result<usize, StorageError> {
        let mut upserted = 0;
        for candle in candles {
            let observation = Observation::from_candle(candle, request.interval);
            if !remaining.remove(&observation.timestamp) {
                continue;
            }
            let outcome = self
                .store
                .upsert_observation(request.instrument_id, &observation)?;
            tracing::trace!(
                instrument = %request.instrument_id,
                slot = %observation.timestamp,
                ?outcome,
                "upserted"
            );
            upserted += 1;
        }
        Ok(upserted)
    }

    fn poll(
        &self,
        request: &ReconcileRequest,
        remaining: &mut BTreeSet<DateTime<Utc>>,
    ) -> Result<(u32, usize), StorageError> {
        let max_attempts = request.max_attempts.max(1);
        let mut attempts = 0;
        let mut upserted = 0;

        while attempts < max_attempts {
            let (Some(&first), Some(&last)) = (remaining.first(), remaining.last()) else {
                break;
            };
            attempts += 1;

            match self
                .source
                .fetch(&request.symbol, first, last, request.interval)
            {
                Ok(candles) if candles.is_empty() => {
                    tracing::debug!(
                        instrument = %request.instrument_id,
                        attempt = attempts,
                        "upstream has no data yet"
                    );
                }
                Ok(candles) => upserted += self.merge(request, &candles, remaining)?,
                Err(e) => tracing::warn!(
                    instrument = %request.instrument_id,
                    symbol = %request.symbol,
                    attempt = attempts,
                    error = %e,
                    "upstream fetch failed"
                ),
            }

            if !remaining.is_empty() && attempts < max_attempts {
                self.sleeper.sleep(request.retry_delay);
            }
        }
        Ok((attempts, upserted))
    }

    fn paginate(
        &self,
        request: &ReconcileRequest,
        range: &MissingRange,
        remaining: &mut BTreeSet<DateTime<Utc>>,
        page_limit: usize,
        max_span: Duration,
        page_delay: std::time::Duration,
    ) -> Result<(u32, usize), StorageError> {
        let interval = request.interval;
        let page_steps = i64::try_from(page_limit.max(1)).unwrap_or(i64::MAX);
        let span_steps = (max_span.num_seconds() / interval.as_secs()).max(1);

        let mut pager = Pager {
            backfill: self,
            request,
            page_delay,
            attempts: 0,
        };
        let mut upserted = 0;
        let mut span_start = range.start;

        'spans: while span_start <= range.end {
            let span_end = advance(span_start, interval, span_steps - 1)
                .map_or(range.end, |t| t.min(range.end));

            let mut page_start = span_start;
            while page_start <= span_end {
                let page_end = advance(page_start, interval, page_steps - 1)
                    .map_or(span_end, |t| t.min(span_end));

                let Some(candles) = pager.fetch(page_start, page_end) else {
                    tracing::warn!(
                        instrument = %request.instrument_id,
                        page_start = %page_start,
                        "attempts exhausted, abandoning rest of range"
                    );
                    break 'spans;
                };
                let Some(last) = candles.iter().map(|c| interval.truncate(c.timestamp)).max()
                else {
                    tracing::debug!(
                        instrument = %request.instrument_id,
                        page_start = %page_start,
                        span_end = %span_end,
                        "empty page, nothing further in this span"
                    );
                    break;
                };
                upserted += self.merge(request, &candles, remaining)?;

                let next = advance(last, interval, 1);
                page_start = match next {
                    Some(t) if t > page_start => t,
                    _ => match advance(page_end, interval, 1) {
                        Some(t) => t,
                        None => break 'spans,
                    },
                };
            }

            span_start = match advance(span_end, interval, 1) {
                Some(t) => t,
                None => break,
            };
        }
        Ok((pager.attempts, upserted))
    }
}

/// Page fetching with per-page retries and pacing between requests.
struct Pager<'p, 'a> {
    backfill: &'p Backfill<'a>,
    request: &'p ReconcileRequest,
    page_delay: std::time::Duration,
    attempts: u32,
}

impl Pager<'_, '_> {
    /// `None` once `max_attempts` consecutive requests for this page failed.
    fn fetch(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Vec<Candle>> {
        let request = self.request;
        let max_attempts = request.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            if self.attempts > 0 {
                let pause = if attempt > 1 {
                    request.retry_delay
                } else {
                    self.page_delay
                };
                self.backfill.sleeper.sleep(pause);
            }
            self.attempts += 1;
            match self
                .backfill
                .source
                .fetch(&request.symbol, start, end, request.interval)
            {
                Ok(candles) => return Some(candles),
                Err(e) => tracing::warn!(
                    instrument = %request.instrument_id,
                    symbol = %request.symbol,
                    page_start = %start,
                    attempt,
                    error = %e,
                    "page fetch failed"
                ),
            }
        }
        None
    }
}
