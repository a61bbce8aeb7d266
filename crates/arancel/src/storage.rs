//! Persistence ports for cached rates and simulation history.
//!
//! Only this module talks to the database. The cache, resolver and simulator
//! work against the [`RateStore`] and [`HistoryStore`] traits, so they run the
//! same against SQLite or the in-memory store used in tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::types::{ArancelError, ArancelResult, ClassificationCode, RateRecord, SimulationRecord};

/// Keyed storage for resolved rates.
pub trait RateStore: Send + Sync {
    /// The stored record for `code`, regardless of its age.
    fn load(&self, code: &ClassificationCode) -> ArancelResult<Option<RateRecord>>;
    /// Insert or fully replace the record for its code.
    fn upsert(&self, record: &RateRecord) -> ArancelResult<()>;
    /// Delete every record, returning how many were removed.
    fn clear(&self) -> ArancelResult<usize>;
}

/// Append-only storage for simulation records.
pub trait HistoryStore: Send + Sync {
    /// Append a record and return its sequence id.
    fn append(&self, record: &SimulationRecord) -> ArancelResult<i64>;
    /// The newest `limit` records, newest first.
    fn recent(&self, limit: usize) -> ArancelResult<Vec<SimulationRecord>>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS simulaciones (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    empresa TEXT,
    fecha TEXT,
    costo_total REAL
);
CREATE TABLE IF NOT EXISTS aranceles_cache (
    partida TEXT PRIMARY KEY,
    gravamen REAL,
    iva REAL,
    ultima_actualizacion TEXT
);";

/// SQLite-backed store holding both tables.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> ArancelResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database.
    pub fn in_memory() -> ArancelResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> ArancelResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> ArancelResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ArancelError::Storage("database lock poisoned".into()))
    }
}

/// Parse a stored `ultima_actualizacion` value.
///
/// Accepts RFC 3339 and naive ISO-8601 timestamps (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl RateStore for SqliteStore {
    fn load(&self, code: &ClassificationCode) -> ArancelResult<Option<RateRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT gravamen, iva, ultima_actualizacion FROM aranceles_cache WHERE partida = ?1",
                params![code.as_str()],
                |row| {
                    Ok((
                        row.get::<_, f64>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((duty_rate, vat_rate, stamp)) = row else {
            return Ok(None);
        };

        match stamp.as_deref().and_then(parse_timestamp) {
            Some(resolved_at) => Ok(Some(RateRecord {
                code: code.clone(),
                duty_rate,
                vat_rate,
                resolved_at,
            })),
            None => {
                tracing::warn!("ignoring cached rate for {code}: unreadable timestamp {stamp:?}");
                Ok(None)
            }
        }
    }

    fn upsert(&self, record: &RateRecord) -> ArancelResult<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO aranceles_cache (partida, gravamen, iva, ultima_actualizacion)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.code.as_str(),
                record.duty_rate,
                record.vat_rate,
                record.resolved_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn clear(&self) -> ArancelResult<usize> {
        Ok(self.conn()?.execute("DELETE FROM aranceles_cache", [])?)
    }
}

impl HistoryStore for SqliteStore {
    fn append(&self, record: &SimulationRecord) -> ArancelResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO simulaciones (empresa, fecha, costo_total) VALUES (?1, ?2, ?3)",
            params![record.company, record.recorded_at, record.total_cost],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn recent(&self, limit: usize) -> ArancelResult<Vec<SimulationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT empresa, fecha, costo_total FROM simulaciones ORDER BY id DESC LIMIT ?1",
        )?;
        let records = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SimulationRecord {
                    company: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    recorded_at: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    total_cost: row.get::<_, Option<f64>>(2)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

/// In-memory store with access counters, for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    rates: Mutex<HashMap<ClassificationCode, RateRecord>>,
    history: Mutex<Vec<SimulationRecord>>,
    rate_loads: AtomicUsize,
    rate_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `load` calls so far.
    pub fn rate_loads(&self) -> usize {
        self.rate_loads.load(Ordering::Relaxed)
    }

    /// Number of `upsert` and `clear` calls so far.
    pub fn rate_writes(&self) -> usize {
        self.rate_writes.load(Ordering::Relaxed)
    }

    /// Number of records currently held, stale ones included.
    pub fn rate_count(&self) -> usize {
        self.rates.lock().map(|r| r.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> ArancelError {
    ArancelError::Storage("memory store lock poisoned".into())
}

impl RateStore for MemoryStore {
    fn load(&self, code: &ClassificationCode) -> ArancelResult<Option<RateRecord>> {
        self.rate_loads.fetch_add(1, Ordering::Relaxed);
        Ok(self.rates.lock().map_err(poisoned)?.get(code).cloned())
    }

    fn upsert(&self, record: &RateRecord) -> ArancelResult<()> {
        self.rate_writes.fetch_add(1, Ordering::Relaxed);
        self.rates
            .lock()
            .map_err(poisoned)?
            .insert(record.code.clone(), record.clone());
        Ok(())
    }

    fn clear(&self) -> ArancelResult<usize> {
        self.rate_writes.fetch_add(1, Ordering::Relaxed);
        let mut rates = self.rates.lock().map_err(poisoned)?;
        let removed = rates.len();
        rates.clear();
        Ok(removed)
    }
}

impl HistoryStore for MemoryStore {
    fn append(&self, record: &SimulationRecord) -> ArancelResult<i64> {
        let mut history = self.history.lock().map_err(poisoned)?;
        history.push(record.clone());
        Ok(history.len() as i64)
    }

    fn recent(&self, limit: usize) -> ArancelResult<Vec<SimulationRecord>> {
        let history = self.history.lock().map_err(poisoned)?;
        Ok(history.iter().rev().take(limit).cloned().collect())
    }
}
