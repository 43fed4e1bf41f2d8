//! SQLite database setup with WAL mode and safety pragmas.
//!
//! The [`Database`] struct wraps a `rusqlite::Connection` behind an
//! `Arc<Mutex<>>` and exposes async methods that use
//! `tokio::task::spawn_blocking` to avoid blocking the async runtime.
//! The mutex is the single-writer lock: no two statements ever run on the
//! connection at the same time.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use crate::config::{DEFAULT_BUSY_TIMEOUT_MS, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::migration;

/// Thread-safe handle to a SQLite database.
///
/// All read/write operations go through [`Database::execute`] which
/// dispatches onto the blocking thread pool via `tokio::task::spawn_blocking`.
/// Clones share the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a writable database at `path`.
    ///
    /// This call blocks briefly (file I/O), so call it during startup before
    /// entering the main async loop, or wrap it in `spawn_blocking` yourself.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        Self::apply_pragmas(&conn, DEFAULT_BUSY_TIMEOUT_MS)?;

        Ok(Self::wrap(conn))
    }

    /// Open an existing database without write access.
    ///
    /// Every write attempted through this handle fails with a SQLite
    /// read-only error.
    pub fn open_read_only(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_read_only_with_timeout(path.as_ref(), DEFAULT_BUSY_TIMEOUT_MS)
    }

    /// Open the database described by `config`.
    ///
    /// For writable stores the parent directory is created when missing.
    pub fn open_with(config: &StoreConfig) -> StoreResult<Self> {
        let path = config.path.as_path();
        if config.read_only {
            return Self::open_read_only_with_timeout(path, config.busy_timeout_ms);
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
            debug!(dir = %parent.display(), "created database directory");
        }

        info!(path = %path.display(), "opening database");
        let conn = Connection::open(path)?;
        Self::apply_pragmas(&conn, config.busy_timeout_ms)?;

        Ok(Self::wrap(conn))
    }

    /// Create an in-memory database, mainly for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory database");

        let conn = Connection::open_in_memory()?;
        Self::apply_pragmas(&conn, DEFAULT_BUSY_TIMEOUT_MS)?;

        Ok(Self::wrap(conn))
    }

    /// Open the database and run all pending migrations.
    pub async fn open_and_migrate(path: impl AsRef<Path> + Send + 'static) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || Self::open(&path)).await??;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending schema migrations.
    ///
    /// Safe to call on every start: applied versions are skipped and
    /// existing rows are never touched.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        self.execute(|conn| migration::run_all(conn)).await
    }

    /// Latest applied migration version, or 0 for an empty database.
    pub async fn schema_version(&self) -> StoreResult<u32> {
        self.execute(|conn| migration::current_version(conn)).await
    }

    /// Execute an arbitrary closure against the connection on the blocking pool.
    ///
    /// This is the primary way to interact with the database from async code.
    /// The closure receives a `&Connection` and must return a `StoreResult<T>`.
    ///
    /// The closure runs to completion even if the returned future is dropped.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let count: i64 = db.execute(|conn| {
    ///     let count = conn.query_row("SELECT count(*) FROM accounts", [], |row| row.get(0))?;
    ///     Ok(count)
    /// }).await?;
    /// ```
    pub async fn execute<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))?;
            f(&conn)
        })
        .await?
    }

    /// Close the connection.
    ///
    /// Fails with [`StoreError::StillShared`] while clones of this handle
    /// (or in-flight operations) still hold the connection.
    pub fn close(self) -> StoreResult<()> {
        let mutex = Arc::try_unwrap(self.conn).map_err(|shared| StoreError::StillShared {
            handles: Arc::strong_count(&shared) - 1,
        })?;
        let conn = mutex
            .into_inner()
            .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))?;
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;

        info!("database closed");
        Ok(())
    }

    // ── internals ────────────────────────────────────────────────────

    fn wrap(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn open_read_only_with_timeout(path: &Path, busy_timeout_ms: u32) -> StoreResult<Self> {
        info!(path = %path.display(), "opening database read-only");

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "busy_timeout", busy_timeout_ms)?;
        conn.pragma_update(None, "query_only", "ON")?;

        Ok(Self::wrap(conn))
    }

    /// Apply all pragmas to a fresh writable connection.
    fn apply_pragmas(conn: &Connection, busy_timeout_ms: u32) -> StoreResult<()> {
        debug!("applying SQLite pragmas");

        // WAL mode: readers never block the writer.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        // NORMAL sync is safe with WAL: we only lose the last transaction
        // on a power failure, not corruption.
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.pragma_update(None, "foreign_keys", "ON")?;

        // Busy timeout so a second process waits instead of failing immediately.
        conn.pragma_update(None, "busy_timeout", busy_timeout_ms)?;

        debug!(busy_timeout_ms, "database pragmas applied");
        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_works() {
        let db = Database::open_in_memory().unwrap();
        let version: String = db
            .execute(|conn| {
                let v: String =
                    conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;
                Ok(v)
            })
            .await
            .unwrap();
        assert!(!version.is_empty());
    }

    #[tokio::test]
    async fn migrations_run_on_fresh_db() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version().await.unwrap(), 0);

        db.run_migrations().await.unwrap();

        let count: i64 = db
            .execute(|conn| {
                let c: i64 =
                    conn.query_row("SELECT count(*) FROM accounts", [], |row| row.get(0))?;
                Ok(c)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(db.schema_version().await.unwrap(), migration::LATEST_VERSION);
    }

    #[tokio::test]
    async fn close_refuses_while_shared() {
        let db = Database::open_in_memory().unwrap();
        let other = db.clone();

        let err = db.close().unwrap_err();
        assert!(matches!(err, StoreError::StillShared { handles: 1 }));

        // The remaining clone is the sole owner now.
        other.close().unwrap();
    }

    #[test]
    fn open_with_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("keyhold.db");

        let db = Database::open_with(&StoreConfig::at(&path)).unwrap();
        db.close().unwrap();

        assert!(path.exists());
    }

    #[test]
    fn read_only_open_of_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Database::open_read_only(dir.path().join("absent.db"));
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }
}
