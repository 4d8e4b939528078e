#![forbid(unsafe_code)]

use super::{ChangeCallback, KvStore, StoreError, StoreEvent, Subscription, WriteOutcome};
use enroll_core::StorePath;
use enroll_core::time::now_ms;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const DB_FILE_NAME: &str = "enroll.db";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct SqliteStoreOptions {
    /// How often subscriptions re-read their path.
    pub poll_interval: Duration,
    /// How long a statement waits on another writer before failing.
    pub busy_timeout: Duration,
}

impl Default for SqliteStoreOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// File-backed store. Several processes may open the same storage directory;
/// they share values through the database and observe each other by polling.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    storage_dir: PathBuf,
    db_path: PathBuf,
    options: SqliteStoreOptions,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(storage_dir, SqliteStoreOptions::default())
    }

    pub fn open_with(
        storage_dir: impl AsRef<Path>,
        options: SqliteStoreOptions,
    ) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE_NAME);
        let conn = open_connection(&db_path, &options)?;
        install_schema(&conn)?;
        tracing::debug!(db = %db_path.display(), "opened sqlite store");

        Ok(Self {
            conn: Mutex::new(conn),
            storage_dir,
            db_path,
            options,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn read(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        let conn = self.conn()?;
        load_value(&conn, path.as_str())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

impl KvStore for SqliteStore {
    fn write(&self, path: &StorePath, value: &Value) -> Result<(), StoreError> {
        let value_json = serde_json::to_string(value)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let seq = next_seq_tx(&tx)?;
        tx.execute(
            "INSERT INTO kv(path, value_json, seq, updated_at_ms) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(path) DO UPDATE SET value_json=excluded.value_json, seq=excluded.seq, updated_at_ms=excluded.updated_at_ms",
            params![path.as_str(), value_json, seq, now_ms()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn conditional_write(
        &self,
        path: &StorePath,
        value: &Value,
    ) -> Result<WriteOutcome, StoreError> {
        let value_json = serde_json::to_string(value)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let seq = next_seq_tx(&tx)?;
        let insert = tx.execute(
            "INSERT INTO kv(path, value_json, seq, updated_at_ms) VALUES (?1, ?2, ?3, ?4)",
            params![path.as_str(), value_json, seq, now_ms()],
        );
        match insert {
            Ok(_) => {
                tx.commit()?;
                Ok(WriteOutcome::Accepted)
            }
            Err(err) if is_constraint_violation(&err) => Ok(WriteOutcome::AlreadyExists),
            Err(err) => Err(StoreError::Sql(err)),
        }
    }

    fn delete(&self, path: &StorePath) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM kv WHERE path=?1", params![path.as_str()])?;
        Ok(())
    }

    fn subscribe(
        &self,
        path: &StorePath,
        on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError> {
        let conn = open_connection(&self.db_path, &self.options)?;
        let mut last = load_row(&conn, path.as_str())?;
        on_change(StoreEvent::Snapshot(
            last.as_ref().map(|(_, raw)| decode_value(raw)),
        ));

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let poll_interval = self.options.poll_interval;
        let path = path.as_str().to_string();
        std::thread::Builder::new()
            .name("enroll-sqlite-watch".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(poll_interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    match load_row(&conn, &path) {
                        Ok(current) if current != last => {
                            on_change(StoreEvent::Snapshot(
                                current.as_ref().map(|(_, raw)| decode_value(raw)),
                            ));
                            last = current;
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::warn!(path = %path, error = %err, "sqlite subscription lost");
                            on_change(StoreEvent::Lost(err.to_string()));
                            break;
                        }
                    }
                }
            })?;

        Ok(Subscription::new(move || drop(stop_tx)))
    }
}

fn open_connection(db_path: &Path, options: &SqliteStoreOptions) -> Result<Connection, StoreError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(options.busy_timeout)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    Ok(conn)
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS kv (
          path TEXT PRIMARY KEY,
          value_json TEXT NOT NULL,
          seq INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        INSERT OR IGNORE INTO meta(key, value) VALUES ('seq', 0);
        "#,
    )?;
    Ok(())
}

fn next_seq_tx(tx: &rusqlite::Transaction<'_>) -> Result<i64, StoreError> {
    tx.execute("UPDATE meta SET value = value + 1 WHERE key='seq'", [])?;
    Ok(tx.query_row("SELECT value FROM meta WHERE key='seq'", [], |row| {
        row.get::<_, i64>(0)
    })?)
}

fn load_row(conn: &Connection, path: &str) -> Result<Option<(i64, String)>, StoreError> {
    conn.query_row(
        "SELECT seq, value_json FROM kv WHERE path=?1",
        params![path],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
    )
    .optional()
    .map_err(StoreError::from)
}

fn load_value(conn: &Connection, path: &str) -> Result<Option<Value>, StoreError> {
    Ok(load_row(conn, path)?.map(|(_, raw)| decode_value(&raw)))
}

// Rows are only written from serialized values; a foreign writer's garbage is
// passed through as a string so the reader can decide what to do with it.
fn decode_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}
