//! Database module for Citycast
//!
//! Provides the SQLite storage handle shared by the credential, session and
//! lucky-draw stores. The handle is opened once at startup, passed around as
//! `Arc<Database>`, and closed explicitly during shutdown.

pub mod schema;

use crate::error::{CoreError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Shared SQLite handle.
///
/// All access goes through a single connection guarded by a mutex; every
/// closure passed to [`Database::with_conn`] runs with exclusive access, so a
/// transaction opened inside it cannot interleave with another caller.
pub struct Database {
    conn: Arc<Mutex<Option<Connection>>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) the database file and initialize the schema
    pub fn open(db_path: PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        schema::init_db(&conn)?;

        tracing::debug!("Opened database at {}", db_path.display());

        Ok(Database {
            conn: Arc::new(Mutex::new(Some(conn))),
            path: Some(db_path),
        })
    }

    /// Open a private in-memory database (tests and one-off tooling)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_db(&conn)?;

        Ok(Database {
            conn: Arc::new(Mutex::new(Some(conn))),
            path: None,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        // A panic inside a closure leaves SQLite itself consistent
        // (the open transaction rolls back on drop), so keep serving.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` against the connection on the current thread.
    ///
    /// Used by the CLI and by callers that are already off the async runtime.
    pub fn with_conn_blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut guard = self.lock();
        let conn = guard.as_mut().ok_or(CoreError::Closed)?;
        f(conn)
    }

    /// Run `f` against the connection on the blocking thread pool
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|e| e.into_inner());
            let conn = guard.as_mut().ok_or(CoreError::Closed)?;
            f(conn)
        })
        .await?
    }

    /// Close the underlying connection.
    ///
    /// Later calls fail with [`CoreError::Closed`]. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let taken = self.lock().take();
        if let Some(conn) = taken {
            conn.close().map_err(|(_, e)| CoreError::Database(e))?;
            tracing::info!("Database closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    /// Get the database file path (None for in-memory databases)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Format a timestamp the way every table stores it.
///
/// Fixed-width UTC with a `Z` suffix, so string order equals time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| CoreError::Validation(format!("Bad timestamp '{}': {}", value, e)))
}
