//! marketwatch core: keeps stored price series complete.
//!
//! - Domain types (instruments, intervals, observations, missing ranges)
//! - Expected-grid generation and gap extraction
//! - Backfill driver with poll and paginated policies
//! - SQLite and in-memory observation stores
//! - Coinbase and Binance candle clients behind a circuit breaker
//! - Indicators over stored closes

pub mod config;
pub mod domain;
pub mod indicators;
pub mod reconcile;
pub mod storage;
pub mod upstream;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: stores, sources and results can cross threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Interval>();
        require_sync::<domain::Interval>();
        require_send::<domain::Observation>();
        require_sync::<domain::Observation>();
        require_send::<domain::MissingRange>();
        require_sync::<domain::MissingRange>();
        require_send::<domain::Instrument>();
        require_sync::<domain::Instrument>();

        // Reconcile types
        require_send::<reconcile::ReconcileRequest>();
        require_sync::<reconcile::ReconcileRequest>();
        require_send::<reconcile::ReconcileReport>();
        require_sync::<reconcile::ReconcileReport>();
        require_send::<reconcile::ReconcileError>();
        require_sync::<reconcile::ReconcileError>();

        // Collaborators
        require_send::<storage::SqliteStore>();
        require_sync::<storage::SqliteStore>();
        require_send::<storage::MemoryStore>();
        require_sync::<storage::MemoryStore>();
        require_send::<upstream::CoinbaseSource>();
        require_sync::<upstream::CoinbaseSource>();
        require_send::<upstream::BinanceSource>();
        require_sync::<upstream::BinanceSource>();
        require_send::<upstream::ScriptedSource>();
        require_sync::<upstream::ScriptedSource>();
    }
}
