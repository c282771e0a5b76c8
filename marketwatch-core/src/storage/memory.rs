//! In-memory store used by tests and dry runs.
//!
//! Counts upsert calls and can be switched into an unavailable state so
//! callers can exercise storage-failure paths.

use super::{
    ExtractStatus, ExtractionRecord, InstrumentStore, ObservationStore, StorageError,
    UpsertOutcome,
};
use crate::domain::{AssetCategory, Instrument, InstrumentId, Observation, ObservationFields};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    instruments: Vec<Instrument>,
    prices: HashMap<InstrumentId, BTreeMap<DateTime<Utc>, ObservationFields>>,
    extractions: HashMap<InstrumentId, ExtractionRecord>,
    upsert_calls: usize,
    unavailable: bool,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed price-only observations without counting them as upserts.
    pub fn seed(&self, instrument: InstrumentId, timestamps: &[DateTime<Utc>]) {
        if let Ok(mut inner) = self.inner.lock() {
            let series = inner.prices.entry(instrument).or_default();
            for &ts in timestamps {
                series.insert(ts, ObservationFields::price_only(1.0));
            }
        }
    }

    /// Number of `upsert_observation` calls so far.
    pub fn upsert_count(&self) -> usize {
        self.inner.lock().map(|i| i.upsert_calls).unwrap_or(0)
    }

    /// Make every subsequent call fail with `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.unavailable = unavailable;
        }
    }

    /// All stored slots for an instrument.
    pub fn stored_slots(&self, instrument: InstrumentId) -> Vec<DateTime<Utc>> {
        self.inner
            .lock()
            .map(|i| {
                i.prices
                    .get(&instrument)
                    .map(|s| s.keys().copied().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;
        if guard.unavailable {
            return Err(StorageError::Unavailable("memory store offline".into()));
        }
        Ok(guard)
    }
}

impl ObservationStore for MemoryStore {
    fn list_observations(
        &self,
        instrument: InstrumentId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StorageError> {
        let inner = self.lock()?;
        if start > end {
            return Ok(Vec::new());
        }
        Ok(inner
            .prices
            .get(&instrument)
            .map(|series| series.range(start..=end).map(|(ts, _)| *ts).collect())
            .unwrap_or_default())
    }

    fn upsert_observation(
        &self,
        instrument: InstrumentId,
        observation: &Observation,
    ) -> Result<UpsertOutcome, StorageError> {
        let mut inner = self.lock()?;
        inner.upsert_calls += 1;
        let series = inner.prices.entry(instrument).or_default();
        let outcome = match series.get(&observation.timestamp) {
            None => UpsertOutcome::Inserted,
            Some(existing) if *existing == observation.fields => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
        };
        if outcome != UpsertOutcome::Unchanged {
            series.insert(observation.timestamp, observation.fields.clone());
        }
        Ok(outcome)
    }

    fn load_observations(
        &self,
        instrument: InstrumentId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, StorageError> {
        let inner = self.lock()?;
        if start > end {
            return Ok(Vec::new());
        }
        Ok(inner
            .prices
            .get(&instrument)
            .map(|series| {
                series
                    .range(start..=end)
                    .map(|(ts, fields)| Observation {
                        timestamp: *ts,
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl InstrumentStore for MemoryStore {
    fn find_instrument(&self, symbol: &str) -> Result<Option<Instrument>, StorageError> {
        let inner = self.lock()?;
        Ok(inner.instruments.iter().find(|i| i.symbol == symbol).cloned())
    }

    fn get_or_create_instrument(
        &self,
        symbol: &str,
        category: AssetCategory,
    ) -> Result<Instrument, StorageError> {
        let mut inner = self.lock()?;
        if let Some(found) = inner.instruments.iter().find(|i| i.symbol == symbol) {
            return Ok(found.clone());
        }
        let id = InstrumentId(inner.instruments.len() as i64 + 1);
        let instrument = Instrument::new(id, symbol, category);
        inner.instruments.push(instrument.clone());
        Ok(instrument)
    }

    fn list_instruments(
        &self,
        category: Option<AssetCategory>,
    ) -> Result<Vec<Instrument>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .instruments
            .iter()
            .filter(|i| category.map_or(true, |c| i.category == c))
            .cloned()
            .collect())
    }

    fn rename_instrument(&self, id: InstrumentId, symbol: &str) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if inner.instruments.iter().any(|i| i.symbol == symbol && i.id != id) {
            return Err(StorageError::Conflict(format!("symbol {symbol} already tracked")));
        }
        let instrument = inner
            .instruments
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("id {id}")))?;
        instrument.symbol = symbol.to_string();
        Ok(())
    }

    fn record_extraction(
        &self,
        id: InstrumentId,
        status: ExtractStatus,
        at: DateTime<Utc>,
    ) -> Result<ExtractionRecord, StorageError> {
        let mut inner = self.lock()?;
        if !inner.instruments.iter().any(|i| i.id == id) {
            return Err(StorageError::NotFound(format!("id {id}")));
        }
        let (date_min, date_max) = inner
            .prices
            .get(&id)
            .map(|s| (s.keys().next().copied(), s.keys().next_back().copied()))
            .unwrap_or((None, None));
        let record = ExtractionRecord {
            instrument_id: id,
            date_min,
            date_max,
            status,
            attempted_at: at,
        };
        inner.extractions.insert(id, record.clone());
        Ok(record)
    }

    fn extraction(&self, id: InstrumentId) -> Result<Option<ExtractionRecord>, StorageError> {
        let inner = self.lock()?;
        if !inner.instruments.iter().any(|i| i.id == id) {
            return Err(StorageError::NotFound(format!("id {id}")));
        }
        Ok(inner.extractions.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn upsert_is_idempotent() {
        let store = MemoryStore::new();
        let obs = Observation::price_only(hour(1), 10.0);
        assert_eq!(store.upsert_observation(InstrumentId(1), &obs).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert_observation(InstrumentId(1), &obs).unwrap(), UpsertOutcome::Unchanged);

        let changed = Observation::price_only(hour(1), 11.0);
        assert_eq!(
            store.upsert_observation(InstrumentId(1), &changed).unwrap(),
            UpsertOutcome::Updated
        );
        assert_eq!(store.upsert_count(), 3);
        assert_eq!(store.stored_slots(InstrumentId(1)), vec![hour(1)]);
    }

    #[test]
    fn list_respects_window() {
        let store = MemoryStore::new();
        store.seed(InstrumentId(1), &[hour(0), hour(2), hour(4)]);
        let listed = store.list_observations(InstrumentId(1), hour(1), hour(4)).unwrap();
        assert_eq!(listed, vec![hour(2), hour(4)]);
        assert!(store.list_observations(InstrumentId(1), hour(4), hour(1)).unwrap().is_empty());
    }

    #[test]
    fn unavailable_store_fails_reads() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = store.list_observations(InstrumentId(1), hour(0), hour(1)).unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }

    #[test]
    fn get_or_create_reuses_existing() {
        let store = MemoryStore::new();
        let a = store.get_or_create_instrument("BTC-EUR", AssetCategory::Crypto).unwrap();
        let b = store.get_or_create_instrument("BTC-EUR", AssetCategory::Crypto).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.list_instruments(Some(AssetCategory::Stock)).unwrap().len(), 0);
    }

    #[test]
    fn rename_refuses_duplicates() {
        let store = MemoryStore::new();
        let a = store.get_or_create_instrument("XRP-EUR", AssetCategory::Crypto).unwrap();
        store.get_or_create_instrument("XRPEUR", AssetCategory::Crypto).unwrap();
        assert!(matches!(
            store.rename_instrument(a.id, "XRPEUR"),
            Err(StorageError::Conflict(_))
        ));
    }

    #[test]
    fn record_extraction_tracks_bounds() {
        let store = MemoryStore::new();
        let inst = store.get_or_create_instrument("ETH-EUR", AssetCategory::Crypto).unwrap();
        store.seed(inst.id, &[hour(3), hour(1)]);
        let rec = store.record_extraction(inst.id, ExtractStatus::Ok, hour(5)).unwrap();
        assert_eq!(rec.date_min, Some(hour(1)));
        assert_eq!(rec.date_max, Some(hour(3)));
        assert_eq!(store.extraction(inst.id).unwrap(), Some(rec));
    }

    #[test]
    fn extraction_of_unknown_instrument_is_not_found() {
        let store = MemoryStore::new();
        let inst = store.get_or_create_instrument("ETH-EUR", AssetCategory::Crypto).unwrap();
        assert_eq!(store.extraction(inst.id).unwrap(), None);
        assert!(matches!(
            store.extraction(InstrumentId(99)),
            Err(StorageError::NotFound(_))
        ));
    }
}
