//! Batch runner: reconcile several instruments in turn.

use super::reconciler::{ReconcileReport, ReconcileRequest, Reconciler};
use super::{ReconcileError, Sleeper};
use crate::storage::{ExtractStatus, InstrumentStore, ObservationStore, StorageError};
use crate::upstream::UpstreamSource;
use chrono::Utc;

/// Progress callback for multi-instrument runs.
pub trait ReconcileProgress {
    /// Called before an instrument is reconciled.
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    /// Called when an instrument finishes, successfully or not.
    fn on_complete(
        &self,
        symbol: &str,
        index: usize,
        total: usize,
        result: &Result<ReconcileReport, ReconcileError>,
    );

    /// Called once the whole batch is done.
    fn on_batch_complete(&self, summary: &BatchSummary);
}

/// Reports progress as `tracing` events.
pub struct TracingProgress;

impl ReconcileProgress for TracingProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        tracing::info!(symbol, "[{}/{}] reconciling", index + 1, total);
    }

    fn on_complete(
        &self,
        symbol: &str,
        _index: usize,
        _total: usize,
        result: &Result<ReconcileReport, ReconcileError>,
    ) {
        match result {
            Ok(report) if report.is_complete() => {
                tracing::info!(symbol, upserted = report.upserted, "complete")
            }
            Ok(report) => tracing::warn!(
                symbol,
                upserted = report.upserted,
                unresolved = report.unresolved.len(),
                "partial"
            ),
            Err(e) => tracing::error!(symbol, error = %e, "failed"),
        }
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        tracing::info!(
            total = summary.total,
            complete = summary.complete,
            partial = summary.partial,
            failed = summary.failed(),
            skipped = summary.skipped.len(),
            status_errors = summary.status_errors.len(),
            "batch finished"
        );
    }
}

/// Summary of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub complete: usize,
    pub partial: usize,
    pub reports: Vec<ReconcileReport>,
    pub errors: Vec<(String, ReconcileError)>,
    /// Instruments whose data work finished but whose extraction status
    /// could not be recorded.
    pub status_errors: Vec<(String, StorageError)>,
    /// Symbols not attempted because the source stopped accepting requests.
    pub skipped: Vec<String>,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    pub fn all_complete(&self) -> bool {
        self.complete == self.total
    }

    pub fn has_storage_failures(&self) -> bool {
        self.errors
            .iter()
            .any(|(_, e)| matches!(e, ReconcileError::StorageUnavailable(_)))
    }
}

/// Reconcile each request in order, recording the extraction status after
/// every instrument.
///
/// A failure for one instrument does not stop the others. If the source stops
/// accepting requests (circuit breaker open), the remaining instruments are
/// skipped.
pub fn reconcile_all<S>(
    store: &S,
    source: &dyn UpstreamSource,
    requests: &[ReconcileRequest],
    sleeper: &dyn Sleeper,
    progress: &dyn ReconcileProgress,
) -> BatchSummary
where
    S: ObservationStore + InstrumentStore,
{
    let total = requests.len();
    let reconciler = Reconciler::new(store, source).with_sleeper(sleeper);
    let mut summary = BatchSummary {
        total,
        ..BatchSummary::default()
    };

    for (i, request) in requests.iter().enumerate() {
        progress.on_start(&request.symbol, i, total);

        let result = reconciler.reconcile(request);
        progress.on_complete(&request.symbol, i, total, &result);

        let status = match &result {
            Ok(report) if report.is_complete() => ExtractStatus::Ok,
            Ok(_) => ExtractStatus::Partial,
            Err(_) => ExtractStatus::Error,
        };
        if let Err(e) = store.record_extraction(request.instrument_id, status, Utc::now()) {
            tracing::warn!(
                instrument = %request.instrument_id,
                symbol = %request.symbol,
                error = %e,
                "could not record extraction status"
            );
            summary.status_errors.push((request.symbol.clone(), e));
        }

        match result {
            Ok(report) => {
                if report.is_complete() {
                    summary.complete += 1;
                } else {
                    summary.partial += 1;
                }
                summary.reports.push(report);
            }
            Err(e) => summary.errors.push((request.symbol.clone(), e)),
        }

        if !source.is_available() {
            summary.skipped = requests[(i + 1)..]
                .iter()
                .map(|r| r.symbol.clone())
                .collect();
            if !summary.skipped.is_empty() {
                tracing::error!(
                    upstream = source.name(),
                    skipped = summary.skipped.len(),
                    "upstream stopped accepting requests, skipping remaining instruments"
                );
            }
            break;
        }
    }

    progress.on_batch_complete(&summary);
    summary
}
