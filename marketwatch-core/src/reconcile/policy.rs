//! Backfill policies and their defaults.

use std::time::Duration;

/// Fetch attempts per range (SingleSlotPoll) or per page (PaginatedBackfill).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_PAGE_LIMIT: usize = 1_000;
pub const DEFAULT_MAX_SPAN_DAYS: i64 = 365;
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(200);

/// How a missing range is pulled from upstream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackfillPolicy {
    /// Re-request the still-missing slots until they all arrive or the
    /// attempt budget runs out, pausing `retry_delay` between attempts.
    ///
    /// Suits sources that publish the latest slot with some delay.
    #[default]
    SingleSlotPoll,

    /// Walk the range forward in pages of at most `page_limit` slots, inside
    /// span windows of at most `max_span`. An empty page means upstream has
    /// nothing further in the current span window.
    PaginatedBackfill {
        page_limit: usize,
        max_span: chrono::Duration,
        page_delay: Duration,
    },
}

impl BackfillPolicy {
    /// Paginated backfill with the default page size, span and delay.
    pub fn paginated() -> Self {
        BackfillPolicy::PaginatedBackfill {
            page_limit: DEFAULT_PAGE_LIMIT,
            max_span: chrono::Duration::days(DEFAULT_MAX_SPAN_DAYS),
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackfillPolicy::SingleSlotPoll => "single_slot_poll",
            BackfillPolicy::PaginatedBackfill { .. } => "paginated_backfill",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_poll() {
        assert_eq!(BackfillPolicy::default(), BackfillPolicy::SingleSlotPoll);
    }

    #[test]
    fn paginated_defaults() {
        match BackfillPolicy::paginated() {
            BackfillPolicy::PaginatedBackfill {
                page_limit,
                max_span,
                page_delay,
            } => {
                assert_eq!(page_limit, 1_000);
                assert_eq!(max_span.num_days(), 365);
                assert_eq!(page_delay, Duration::from_millis(200));
            }
            other => panic!("unexpected policy {other:?}"),
        }
    }
}
