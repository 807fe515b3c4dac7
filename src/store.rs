//! ==============================================================================
//! store.rs - sqlite-backed reading table
//! ==============================================================================
//!
//! purpose:
//!     durable storage for sensor readings. one table, one connection.
//!
//! concurrency:
//!     the connection sits behind a mutex and every method is blocking.
//!     async callers go through `Store::call`, which hops onto tokio's
//!     blocking pool (same pattern as offloading a slow sensor read).
//!
//! relationships:
//!     - used by: server.rs (crud handlers)
//!     - used by: broadcast.rs (filtered/sorted snapshot per tick)
//!
//! ==============================================================================

use crate::clock::{Clock, Stamp, DISPLAY_FORMAT};
use crate::domain::{Reading, SortOrder};

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

const TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS sensor_data (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    value       REAL    NOT NULL,
    date        TEXT    NOT NULL,
    recorded_at INTEGER NOT NULL
);";

const INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_sensor_data_recorded_at ON sensor_data (recorded_at);";

// tables written before `recorded_at` existed carry only (id, value, date)
const ADD_RECORDED_AT_SQL: &str =
    "ALTER TABLE sensor_data ADD COLUMN recorded_at INTEGER NOT NULL DEFAULT 0;";

const READING_SELECT_SQL: &str = "SELECT id, value, date, recorded_at FROM sensor_data";

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store connection poisoned by a panicked writer")]
    Poisoned,
    #[error("blocking store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Filter, order and limit for a reading listing.
#[derive(Clone, Copy, Debug)]
pub struct ReadingQuery {
    pub order: SortOrder,
    /// inclusive lower bound on `recorded_at`
    pub since_ms: Option<i64>,
    /// inclusive upper bound on `recorded_at`
    pub until_ms: Option<i64>,
    pub limit: u32,
}

impl ReadingQuery {
    /// newest first, no bounds
    pub fn latest(limit: u32) -> Self {
        Self {
            order: SortOrder::Descending,
            since_ms: None,
            until_ms: None,
            limit,
        }
    }
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database file and ensure the schema exists.
    ///
    /// A table without `recorded_at` gets the column added, with each row's
    /// value derived from its `date` text read in `clock`'s zone.
    pub fn open(path: impl AsRef<Path>, clock: &Clock) -> StoreResult<Self> {
        let started_at = Instant::now();
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let store = Self::bootstrap(conn, clock)?;
        tracing::info!(
            path = %path.display(),
            rows = store.count()?,
            duration_ms = started_at.elapsed().as_millis() as u64,
            "store opened"
        );
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::bootstrap(Connection::open_in_memory()?, &Clock::default())
    }

    fn bootstrap(mut conn: Connection, clock: &Clock) -> StoreResult<Self> {
        conn.execute_batch(TABLE_SQL)?;
        if !has_column(&conn, "sensor_data", "recorded_at")? {
            backfill_recorded_at(&mut conn, clock)?;
        }
        conn.execute_batch(INDEX_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    /// Run a blocking store operation on tokio's blocking pool.
    pub async fn call<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Store) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store)).await?
    }

    pub fn insert(&self, value: f64, stamp: &Stamp) -> StoreResult<Reading> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sensor_data (value, date, recorded_at) VALUES (?1, ?2, ?3);",
                params![value, stamp.display, stamp.epoch_ms],
            )?;
            Ok(Reading {
                id: conn.last_insert_rowid(),
                date: stamp.display.clone(),
                value,
                recorded_at: stamp.epoch_ms,
            })
        })
    }

    pub fn get(&self, id: i64) -> StoreResult<Option<Reading>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{READING_SELECT_SQL} WHERE id = ?1;"))?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(parse_reading_row(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Overwrite the value of a reading. Returns the number of rows touched,
    /// zero when the id does not exist.
    pub fn update_value(&self, id: i64, value: f64) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sensor_data SET value = ?1 WHERE id = ?2;",
                params![value, id],
            )?;
            Ok(changed)
        })
    }

    /// Remove a reading. Returns whether a row was deleted.
    pub fn delete(&self, id: i64) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM sensor_data WHERE id = ?1;", params![id])?;
            Ok(changed > 0)
        })
    }

    pub fn query(&self, query: &ReadingQuery) -> StoreResult<Vec<Reading>> {
        // `order` comes from a closed enum, never from user text
        let sql = format!(
            "{READING_SELECT_SQL}
             WHERE (?1 IS NULL OR recorded_at >= ?1)
               AND (?2 IS NULL OR recorded_at <= ?2)
             ORDER BY recorded_at {dir}, id {dir}
             LIMIT ?3;",
            dir = query.order.as_sql()
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![query.since_ms, query.until_ms, query.limit],
                parse_reading_row,
            )?;
            let mut readings = Vec::new();
            for row in rows {
                readings.push(row?);
            }
            Ok(readings)
        })
    }

    pub fn count(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM sensor_data;", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
    }
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn backfill_recorded_at(conn: &mut Connection, clock: &Clock) -> StoreResult<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(ADD_RECORDED_AT_SQL)?;

    let rows: Vec<(i64, String)> = {
        let mut stmt = tx.prepare("SELECT id, date FROM sensor_data;")?;
        let mapped = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        mapped.collect::<rusqlite::Result<_>>()?
    };

    let mut unreadable = 0usize;
    for (id, date) in &rows {
        match NaiveDateTime::parse_from_str(date, DISPLAY_FORMAT) {
            Ok(local) => {
                tx.execute(
                    "UPDATE sensor_data SET recorded_at = ?1 WHERE id = ?2;",
                    params![clock.local_to_epoch_ms(local), id],
                )?;
            }
            Err(_) => unreadable += 1,
        }
    }
    tx.commit()?;

    if unreadable > 0 {
        tracing::warn!(unreadable, "rows with unreadable dates keep recorded_at = 0");
    }
    tracing::info!(rows = rows.len(), "added recorded_at to existing sensor_data table");
    Ok(())
}

fn parse_reading_row(row: &Row<'_>) -> rusqlite::Result<Reading> {
    Ok(Reading {
        id: row.get(0)?,
        value: row.get(1)?,
        date: row.get(2)?,
        recorded_at: row.get(3)?,
    })
}
