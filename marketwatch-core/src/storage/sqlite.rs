//! SQLite store using `rusqlite`.
//!
//! Two tables: `instruments` (registry plus extraction bookkeeping) and
//! `prices` keyed on (instrument_id, price_date). Timestamps are stored as Unix
//! seconds. Every statement is parameterized.

use super::{
    ExtractStatus, ExtractionRecord, InstrumentStore, ObservationStore, StorageError,
    UpsertOutcome,
};
use crate::domain::{AssetCategory, Instrument, InstrumentId, Observation, ObservationFields};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS instruments (
        instrument_id        INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol               TEXT NOT NULL UNIQUE,
        category             TEXT NOT NULL CHECK (category IN ('STOCK', 'ETF', 'CRYPTO')),
        date_min             INTEGER,
        date_max             INTEGER,
        last_extract_status  TEXT,
        last_extract_attempt INTEGER
    );
    CREATE TABLE IF NOT EXISTS prices (
        instrument_id INTEGER NOT NULL,
        price_date    INTEGER NOT NULL,
        price_value   REAL NOT NULL,
        open_value    REAL,
        high_value    REAL,
        low_value     REAL,
        close_value   REAL,
        volume        REAL,
        PRIMARY KEY (instrument_id, price_date)
    );";

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Unavailable(e.to_string())
    }
}

/// SQLite-backed store. Owns a single connection for its lifetime.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            StorageError::Unavailable(format!("open {}: {e}", path.as_ref().display()))
        })?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an already-open connection, creating missing tables.
    pub fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("connection lock poisoned".into()))
    }
}

fn to_ts(secs: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StorageError::Corrupt(format!("timestamp out of range: {secs}")))
}

fn opt_ts(secs: Option<i64>) -> Result<Option<DateTime<Utc>>, StorageError> {
    secs.map(to_ts).transpose()
}

fn read_fields(row: &Row<'_>, offset: usize) -> rusqlite::Result<ObservationFields> {
    Ok(ObservationFields {
        price: row.get(offset)?,
        open: row.get(offset + 1)?,
        high: row.get(offset + 2)?,
        low: row.get(offset + 3)?,
        close: row.get(offset + 4)?,
        volume: row.get(offset + 5)?,
    })
}

fn read_instrument(row: &Row<'_>) -> rusqlite::Result<(i64, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn to_instrument((id, symbol, category): (i64, String, String)) -> Result<Instrument, StorageError> {
    let category = category
        .parse::<AssetCategory>()
        .map_err(StorageError::Corrupt)?;
    Ok(Instrument::new(InstrumentId(id), symbol, category))
}

impl ObservationStore for SqliteStore {
    fn list_observations(
        &self,
        instrument: InstrumentId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT price_date FROM prices
             WHERE instrument_id = ?1 AND price_date BETWEEN ?2 AND ?3
             ORDER BY price_date",
        )?;
        let rows = stmt.query_map(
            params![instrument.0, start.timestamp(), end.timestamp()],
            |row| row.get::<_, i64>(0),
        )?;
        let mut out = Vec::new();
        for secs in rows {
            out.push(to_ts(secs?)?);
        }
        Ok(out)
    }

    fn upsert_observation(
        &self,
        instrument: InstrumentId,
        observation: &Observation,
    ) -> Result<UpsertOutcome, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let ts = observation.timestamp.timestamp();
        let f = &observation.fields;

        let existing = tx
            .query_row(
                "SELECT price_value, open_value, high_value, low_value, close_value, volume
                 FROM prices WHERE instrument_id = ?1 AND price_date = ?2",
                params![instrument.0, ts],
                |row| read_fields(row, 0),
            )
            .optional()?;

        let outcome = match existing {
            Some(ref stored) if stored == f => UpsertOutcome::Unchanged,
            Some(_) => {
                tx.execute(
                    "UPDATE prices
                     SET price_value = ?3, open_value = ?4, high_value = ?5,
                         low_value = ?6, close_value = ?7, volume = ?8
                     WHERE instrument_id = ?1 AND price_date = ?2",
                    params![instrument.0, ts, f.price, f.open, f.high, f.low, f.close, f.volume],
                )?;
                UpsertOutcome::Updated
            }
            None => {
                tx.execute(
                    "INSERT INTO prices
                     (instrument_id, price_date, price_value, open_value, high_value,
                      low_value, close_value, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![instrument.0, ts, f.price, f.open, f.high, f.low, f.close, f.volume],
                )?;
                UpsertOutcome::Inserted
            }
        };
        tx.commit()?;
        Ok(outcome)
    }

    fn load_observations(
        &self,
        instrument: InstrumentId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT price_date, price_value, open_value, high_value, low_value, close_value, volume
             FROM prices
             WHERE instrument_id = ?1 AND price_date BETWEEN ?2 AND ?3
             ORDER BY price_date",
        )?;
        let rows = stmt.query_map(
            params![instrument.0, start.timestamp(), end.timestamp()],
            |row| Ok((row.get::<_, i64>(0)?, read_fields(row, 1)?)),
        )?;
        let mut out = Vec::new();
        for row in rows {
            let (secs, fields) = row?;
            out.push(Observation {
                timestamp: to_ts(secs)?,
                fields,
            });
        }
        Ok(out)
    }
}

impl InstrumentStore for SqliteStore {
    fn find_instrument(&self, symbol: &str) -> Result<Option<Instrument>, StorageError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT instrument_id, symbol, category FROM instruments WHERE symbol = ?1",
            params![symbol],
            read_instrument,
        )
        .optional()?
        .map(to_instrument)
        .transpose()
    }

    fn get_or_create_instrument(
        &self,
        symbol: &str,
        category: AssetCategory,
    ) -> Result<Instrument, StorageError> {
        if let Some(found) = self.find_instrument(symbol)? {
            return Ok(found);
        }
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO instruments (symbol, category) VALUES (?1, ?2)",
            params![symbol, category.as_str()],
        )?;
        let id = InstrumentId(conn.last_insert_rowid());
        tracing::info!(instrument = %id, symbol, %category, "created instrument");
        Ok(Instrument::new(id, symbol, category))
    }

    fn list_instruments(
        &self,
        category: Option<AssetCategory>,
    ) -> Result<Vec<Instrument>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT instrument_id, symbol, category FROM instruments
             WHERE ?1 IS NULL OR category = ?1
             ORDER BY instrument_id",
        )?;
        let rows = stmt.query_map(params![category.map(|c| c.as_str())], read_instrument)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(to_instrument(row?)?);
        }
        Ok(out)
    }

    fn rename_instrument(&self, id: InstrumentId, symbol: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let clash: Option<i64> = conn
            .query_row(
                "SELECT instrument_id FROM instruments WHERE symbol = ?1 AND instrument_id <> ?2",
                params![symbol, id.0],
                |row| row.get(0),
            )
            .optional()?;
        if clash.is_some() {
            return Err(StorageError::Conflict(format!("symbol {symbol} already tracked")));
        }
        let changed = conn.execute(
            "UPDATE instruments SET symbol = ?1 WHERE instrument_id = ?2",
            params![symbol, id.0],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("id {id}")));
        }
        Ok(())
    }

    fn record_extraction(
        &self,
        id: InstrumentId,
        status: ExtractStatus,
        at: DateTime<Utc>,
    ) -> Result<ExtractionRecord, StorageError> {
        let conn = self.lock()?;
        let (min, max): (Option<i64>, Option<i64>) = conn.query_row(
            "SELECT MIN(price_date), MAX(price_date) FROM prices WHERE instrument_id = ?1",
            params![id.0],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let changed = conn.execute(
            "UPDATE instruments
             SET date_min = ?2, date_max = ?3, last_extract_status = ?4, last_extract_attempt = ?5
             WHERE instrument_id = ?1",
            params![id.0, min, max, status.as_str(), at.timestamp()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("id {id}")));
        }
        Ok(ExtractionRecord {
            instrument_id: id,
            date_min: opt_ts(min)?,
            date_max: opt_ts(max)?,
            status,
            attempted_at: to_ts(at.timestamp())?,
        })
    }

    fn extraction(&self, id: InstrumentId) -> Result<Option<ExtractionRecord>, StorageError> {
        let conn = self.lock()?;
        let row: Option<(Option<i64>, Option<i64>, Option<String>, Option<i64>)> = conn
            .query_row(
                "SELECT date_min, date_max, last_extract_status, last_extract_attempt
                 FROM instruments WHERE instrument_id = ?1",
                params![id.0],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((min, max, status, attempted)) = row else {
            return Err(StorageError::NotFound(format!("id {id}")));
        };
        let (Some(status), Some(attempted)) = (status, attempted) else {
            return Ok(None);
        };
        let status = ExtractStatus::parse(&status)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown extract status '{status}'")))?;
        Ok(Some(ExtractionRecord {
            instrument_id: id,
            date_min: opt_ts(min)?,
            date_max: opt_ts(max)?,
            status,
            attempted_at: to_ts(attempted)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Candle;
    use crate::domain::Interval;
    use chrono::TimeZone;

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    fn candle(h: u32, close: f64) -> Observation {
        Observation::from_candle(
            &Candle {
                timestamp: hour(h),
                open: close - 1.0,
                high: close + 1.0,
                low: close - 2.0,
                close,
                volume: 100.0,
            },
            Interval::HOUR,
        )
    }

    #[test]
    fn upsert_insert_update_unchanged() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = InstrumentId(1);
        assert_eq!(store.upsert_observation(id, &candle(1, 10.0)).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert_observation(id, &candle(1, 10.0)).unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(store.upsert_observation(id, &candle(1, 12.0)).unwrap(), UpsertOutcome::Updated);

        let loaded = store.load_observations(id, hour(0), hour(5)).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].fields.close, Some(12.0));
    }

    #[test]
    fn price_only_rows_keep_nulls() {
        let store = SqliteStore::open_in_memory().unwrap();
        let obs = Observation::price_only(hour(2), 3.5);
        store.upsert_observation(InstrumentId(1), &obs).unwrap();
        let loaded = store.load_observations(InstrumentId(1), hour(0), hour(5)).unwrap();
        assert_eq!(loaded, vec![obs.clone()]);
        assert_eq!(
            store.upsert_observation(InstrumentId(1), &obs).unwrap(),
            UpsertOutcome::Unchanged
        );
    }

    #[test]
    fn list_is_ordered_and_windowed() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = InstrumentId(3);
        for h in [4, 0, 2] {
            store.upsert_observation(id, &candle(h, 1.0)).unwrap();
        }
        store.upsert_observation(InstrumentId(4), &candle(1, 1.0)).unwrap();
        assert_eq!(store.list_observations(id, hour(0), hour(3)).unwrap(), vec![hour(0), hour(2)]);
    }

    #[test]
    fn instruments_get_or_create_and_filter() {
        let store = SqliteStore::open_in_memory().unwrap();
        let btc = store.get_or_create_instrument("BTC-EUR", AssetCategory::Crypto).unwrap();
        let again = store.get_or_create_instrument("BTC-EUR", AssetCategory::Crypto).unwrap();
        assert_eq!(btc, again);
        store.get_or_create_instrument("AAPL.US", AssetCategory::Stock).unwrap();

        assert_eq!(store.list_instruments(None).unwrap().len(), 2);
        let crypto = store.list_instruments(Some(AssetCategory::Crypto)).unwrap();
        assert_eq!(crypto, vec![btc]);
    }

    #[test]
    fn rename_corrects_symbol() {
        let store = SqliteStore::open_in_memory().unwrap();
        let inst = store.get_or_create_instrument("XRPEUR", AssetCategory::Crypto).unwrap();
        store.rename_instrument(inst.id, "XRP-EUR").unwrap();
        assert_eq!(store.find_instrument("XRP-EUR").unwrap().map(|i| i.id), Some(inst.id));
        assert!(store.find_instrument("XRPEUR").unwrap().is_none());
        assert!(matches!(
            store.rename_instrument(InstrumentId(99), "DOGE-EUR"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn extraction_status_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let inst = store.get_or_create_instrument("ETH-EUR", AssetCategory::Crypto).unwrap();
        assert_eq!(store.extraction(inst.id).unwrap(), None);

        store.upsert_observation(inst.id, &candle(5, 1.0)).unwrap();
        store.upsert_observation(inst.id, &candle(2, 1.0)).unwrap();
        let rec = store.record_extraction(inst.id, ExtractStatus::Partial, hour(6)).unwrap();
        assert_eq!(rec.date_min, Some(hour(2)));
        assert_eq!(rec.date_max, Some(hour(5)));
        assert_eq!(store.extraction(inst.id).unwrap(), Some(rec));
        assert!(matches!(
            store.extraction(InstrumentId(99)),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert_observation(InstrumentId(1), &candle(3, 7.0)).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_observations(InstrumentId(1), hour(0), hour(5)).unwrap(), vec![hour(3)]);
    }
}
