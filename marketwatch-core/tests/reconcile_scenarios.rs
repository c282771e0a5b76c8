//! End-to-end reconciliation scenarios.
//!
//! Tests:
//! 1. Scattered holes are found as single-slot ranges
//! 2. An empty store yields one range over the whole window
//! 3. A late-publishing slot resolves on the third poll after two pauses
//! 4. An upstream failing for one range leaves only that range unresolved
//! 5. Paginated backfill fills a long history through SQLite
//! 6. A storage outage aborts the instrument
//! 7. Batch run records extraction status through SQLite

use chrono::{DateTime, Duration, TimeZone, Utc};
use marketwatch_core::domain::{AssetCategory, InstrumentId, Interval, MissingRange};
use marketwatch_core::reconcile::{
    reconcile_all, BackfillPolicy, ReconcileError, ReconcileRequest, Reconciler, RecordingSleeper,
    TracingProgress,
};
use marketwatch_core::storage::{
    ExtractStatus, InstrumentStore, MemoryStore, ObservationStore, SqliteStore,
};
use marketwatch_core::upstream::{flat_candle, ScriptedSource, UpstreamError};
use std::time::Duration as StdDuration;

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

const ID: InstrumentId = InstrumentId(1);

fn hour(h: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
}

fn hourly_request(start: i64, end: i64) -> ReconcileRequest {
    ReconcileRequest::new(ID, "BTC-EUR", hour(start), hour(end), Interval::HOUR)
}

fn full_history(hours: i64) -> ScriptedSource {
    ScriptedSource::from_candles(
        (0..hours)
            .map(|h| flat_candle(hour(h), 100.0 + h as f64))
            .collect(),
    )
}

// ──────────────────────────────────────────────
// Gap detection
// ──────────────────────────────────────────────

#[test]
fn scattered_holes_become_single_slot_ranges() {
    let store = MemoryStore::new();
    store.seed(ID, &[hour(1), hour(2), hour(4)]);
    let source = ScriptedSource::empty();

    let gaps = Reconciler::new(&store, &source)
        .plan(&hourly_request(0, 5))
        .unwrap();

    assert_eq!(
        gaps,
        vec![
            MissingRange::single(ID, hour(0)),
            MissingRange::single(ID, hour(3)),
            MissingRange::single(ID, hour(5)),
        ]
    );
}

#[test]
fn empty_store_is_one_range() {
    let store = MemoryStore::new();
    let source = ScriptedSource::empty();

    let gaps = Reconciler::new(&store, &source)
        .plan(&hourly_request(0, 5))
        .unwrap();

    assert_eq!(gaps, vec![MissingRange::new(ID, hour(0), hour(5))]);
}

// ──────────────────────────────────────────────
// Backfill
// ──────────────────────────────────────────────

#[test]
fn late_slot_resolves_on_third_poll() {
    let store = MemoryStore::new();
    store.seed(ID, &(0..5).map(hour).collect::<Vec<_>>());
    let source = ScriptedSource::new(|call| {
        if call.call_no < 3 {
            Ok(vec![])
        } else {
            Ok(vec![flat_candle(hour(5), 105.0)])
        }
    });
    let sleeper = RecordingSleeper::new();

    let report = Reconciler::new(&store, &source)
        .with_sleeper(&sleeper)
        .reconcile(&hourly_request(0, 5).with_retry(3, StdDuration::from_secs(30)))
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.attempts, 3);
    assert_eq!(report.upserted, 1);
    assert_eq!(sleeper.sleeps(), vec![StdDuration::from_secs(30); 2]);
    assert_eq!(store.stored_slots(ID).len(), 6);
}

#[test]
fn failing_middle_range_is_isolated() {
    let store = MemoryStore::new();
    // gaps: R1 = 00..01, R2 = 04..05, R3 = 08..09
    store.seed(ID, &[hour(2), hour(3), hour(6), hour(7)]);
    let source = ScriptedSource::new(|call| {
        if call.start >= hour(4) && call.start <= hour(5) {
            Err(UpstreamError::NetworkUnreachable("connection reset".into()))
        } else {
            Ok((0..10)
                .map(|h| flat_candle(hour(h), 1.0))
                .filter(|c| c.timestamp >= call.start && c.timestamp <= call.end)
                .collect())
        }
    });
    let sleeper = RecordingSleeper::new();

    let report = Reconciler::new(&store, &source)
        .with_sleeper(&sleeper)
        .reconcile(&hourly_request(0, 9).with_retry(2, StdDuration::from_secs(1)))
        .unwrap();

    assert_eq!(report.ranges_found.len(), 3);
    assert_eq!(report.unresolved, vec![MissingRange::new(ID, hour(4), hour(5))]);
    assert_eq!(report.upserted, 4);
    let stored = store.stored_slots(ID);
    for h in [0, 1, 8, 9] {
        assert!(stored.contains(&hour(h)), "slot {h} should be filled");
    }
}

#[test]
fn unresolved_ranges_heal_on_next_run() {
    let store = MemoryStore::new();
    let source = ScriptedSource::new(|call| {
        // first run: upstream down; afterwards, everything is there
        if call.call_no == 1 {
            Err(UpstreamError::Http("HTTP 502 from scripted".into()))
        } else {
            Ok((0..6)
                .map(|h| flat_candle(hour(h), 1.0))
                .filter(|c| c.timestamp >= call.start && c.timestamp <= call.end)
                .collect())
        }
    });
    let sleeper = RecordingSleeper::new();
    let reconciler = Reconciler::new(&store, &source).with_sleeper(&sleeper);
    let request = hourly_request(0, 5).with_retry(1, StdDuration::ZERO);

    let first = reconciler.reconcile(&request).unwrap();
    assert_eq!(first.unresolved, vec![MissingRange::new(ID, hour(0), hour(5))]);

    let second = reconciler.reconcile(&request).unwrap();
    assert!(second.is_complete());
    assert_eq!(second.upserted, 6);
}

#[test]
fn paginated_backfill_through_sqlite() {
    let store = SqliteStore::open_in_memory().unwrap();
    let btc = store
        .get_or_create_instrument("BTC-EUR", AssetCategory::Crypto)
        .unwrap();
    let source = full_history(72);
    let sleeper = RecordingSleeper::new();

    let request = ReconcileRequest::new(btc.id, "BTC-EUR", hour(0), hour(71), Interval::HOUR)
        .with_policy(BackfillPolicy::PaginatedBackfill {
            page_limit: 24,
            max_span: Duration::days(365),
            page_delay: StdDuration::from_millis(200),
        });
    let report = Reconciler::new(&store, &source)
        .with_sleeper(&sleeper)
        .reconcile(&request)
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.upserted, 72);
    assert_eq!(source.call_count(), 3);
    assert_eq!(sleeper.sleeps(), vec![StdDuration::from_millis(200); 2]);

    let stored = store.list_observations(btc.id, hour(0), hour(71)).unwrap();
    assert_eq!(stored.len(), 72);
    let obs = store.load_observations(btc.id, hour(10), hour(10)).unwrap();
    assert_eq!(obs[0].fields.close, Some(110.0));
}

#[test]
fn storage_outage_aborts_instrument() {
    let store = MemoryStore::new();
    store.set_unavailable(true);
    let source = full_history(6);

    let err = Reconciler::new(&store, &source)
        .reconcile(&hourly_request(0, 5))
        .unwrap_err();

    assert!(matches!(err, ReconcileError::StorageUnavailable(_)));
    assert_eq!(source.call_count(), 0);
}

// ──────────────────────────────────────────────
// Batch + SQLite
// ──────────────────────────────────────────────

#[test]
fn batch_records_extraction_status_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("marketwatch.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        let btc = store
            .get_or_create_instrument("BTC-EUR", AssetCategory::Crypto)
            .unwrap();
        let xrp = store
            .get_or_create_instrument("XRP-EUR", AssetCategory::Crypto)
            .unwrap();
        let source = ScriptedSource::new(|call| {
            if call.symbol == "BTC-EUR" {
                Ok((0..6)
                    .map(|h| flat_candle(hour(h), 1.0))
                    .filter(|c| c.timestamp >= call.start && c.timestamp <= call.end)
                    .collect())
            } else {
                Err(UpstreamError::SymbolNotFound {
                    symbol: call.symbol.clone(),
                })
            }
        });
        let requests = vec![
            ReconcileRequest::new(btc.id, "BTC-EUR", hour(0), hour(5), Interval::HOUR),
            ReconcileRequest::new(xrp.id, "XRP-EUR", hour(0), hour(5), Interval::HOUR)
                .with_retry(2, StdDuration::ZERO),
        ];

        let summary = reconcile_all(
            &store,
            &source,
            &requests,
            &RecordingSleeper::new(),
            &TracingProgress,
        );
        assert_eq!(summary.complete, 1);
        assert_eq!(summary.partial, 1);
        assert!(!summary.has_storage_failures());
    }

    let reopened = SqliteStore::open(&path).unwrap();
    let btc = reopened.find_instrument("BTC-EUR").unwrap().unwrap();
    let xrp = reopened.find_instrument("XRP-EUR").unwrap().unwrap();

    let btc_record = reopened.extraction(btc.id).unwrap().unwrap();
    assert_eq!(btc_record.status, ExtractStatus::Ok);
    assert_eq!(btc_record.date_min, Some(hour(0)));
    assert_eq!(btc_record.date_max, Some(hour(5)));

    let xrp_record = reopened.extraction(xrp.id).unwrap().unwrap();
    assert_eq!(xrp_record.status, ExtractStatus::Partial);
    assert_eq!(xrp_record.date_min, None);
}
