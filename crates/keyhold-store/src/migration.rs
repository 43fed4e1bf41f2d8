//! Schema migration system.
//!
//! Migrations are stored as static SQL strings keyed by version number.
//! The current version is tracked in a `_migrations` table so migrations
//! are idempotent and only run once. Migrations only ever add: tables,
//! columns and indexes are created, nothing is dropped.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// A single migration definition.
struct Migration {
    /// Monotonically increasing version number (1, 2, 3, ...).
    version: u32,
    /// Human-readable description.
    description: &'static str,
    /// Raw SQL to execute. May contain multiple statements separated by `;`.
    sql: &'static str,
    /// Table shape that must hold once `sql` has run.
    shape: Shape,
}

/// Columns a migrated table must have, and which of them must be unique.
///
/// `CREATE TABLE IF NOT EXISTS` silently keeps whatever table is already
/// there, so the result is checked before the migration is recorded.
struct Shape {
    table: &'static str,
    columns: &'static [&'static str],
    unique: &'static [&'static str],
}

/// All migrations in order. Add new migrations to the end of this array.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "accounts table keyed by unique identifier",
        sql: r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                identifier  TEXT NOT NULL UNIQUE,
                secret      TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );
        "#,
        shape: Shape {
            table: "accounts",
            columns: &["id", "identifier", "secret", "created_at"],
            unique: &["identifier"],
        },
    },
    Migration {
        version: 2,
        description: "per-account secret scheme",
        sql: r#"
            ALTER TABLE accounts ADD COLUMN secret_scheme TEXT NOT NULL DEFAULT 'plain'
                CHECK(secret_scheme IN ('plain', 'pbkdf2'));
        "#,
        shape: Shape {
            table: "accounts",
            columns: &["secret_scheme"],
            unique: &[],
        },
    },
];

/// The version the schema ends up at after [`run_all`].
pub const LATEST_VERSION: u32 = 2;

// ── public API ───────────────────────────────────────────────────────

/// Run all pending migrations against `conn`.
///
/// This is a **synchronous** function; call it from `spawn_blocking`.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    run_up_to(conn, u32::MAX)
}

/// Return the latest applied migration version, or 0 if none.
///
/// Only reads, so it also works on read-only connections.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    let tracked: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_migrations')",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Migration {
            version: 0,
            message: format!("failed to inspect schema: {e}"),
        })?;
    if !tracked {
        return Ok(0);
    }

    let version: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Migration {
            version: 0,
            message: format!("failed to read current version: {e}"),
        })?;
    Ok(version)
}

// ── internals ────────────────────────────────────────────────────────

/// Apply pending migrations with a version no greater than `target`.
fn run_up_to(conn: &Connection, target: u32) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|m| m.version > current && m.version <= target)
        .collect();

    if pending.is_empty() {
        debug!(current_version = current, "database schema is up to date");
        return Ok(());
    }

    info!(
        current_version = current,
        pending = pending.len(),
        "running pending migrations"
    );

    for migration in pending {
        apply(conn, migration)?;
    }

    info!(
        new_version = current_version(conn)?,
        "all migrations applied"
    );
    Ok(())
}

/// Create the `_migrations` bookkeeping table if it does not exist.
fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to create _migrations table: {e}"),
    })?;
    Ok(())
}

/// Apply a single migration inside a transaction.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    info!(
        version = migration.version,
        description = migration.description,
        "applying migration"
    );

    // `conn.transaction()` needs `&mut Connection`, so the transaction is
    // managed by hand.
    conn.execute_batch("BEGIN IMMEDIATE;")
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("failed to begin transaction: {e}"),
        })?;

    let result = (|| -> StoreResult<()> {
        conn.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                message: format!("SQL execution failed: {e}"),
            })?;

        check_shape(conn, migration)?;

        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![migration.version, migration.description, now],
        )
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("failed to record migration: {e}"),
        })?;

        Ok(())
    })();

    match &result {
        Ok(()) => {
            conn.execute_batch("COMMIT;")
                .map_err(|e| StoreError::Migration {
                    version: migration.version,
                    message: format!("failed to commit: {e}"),
                })?;
            info!(
                version = migration.version,
                "migration applied successfully"
            );
        }
        Err(err) => {
            warn!(version = migration.version, %err, "migration failed, rolling back");
            let _ = conn.execute_batch("ROLLBACK;");
        }
    }

    result
}

/// Fail with [`StoreError::Migration`] if the table `migration` leaves
/// behind lacks an expected column or unique constraint.
fn check_shape(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    let shape = &migration.shape;
    let mismatch = |message: String| StoreError::Migration {
        version: migration.version,
        message,
    };

    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let present = stmt
        .query_map([shape.table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for column in shape.columns {
        if !present.iter().any(|p| p == column) {
            return Err(mismatch(format!("table {} has no column {column}", shape.table)));
        }
    }

    // Only a single-column unique index makes the column itself unique.
    let mut stmt = conn.prepare(
        "SELECT EXISTS(
            SELECT 1 FROM pragma_index_list(?1) AS il
            WHERE il.\"unique\" = 1
              AND (SELECT COUNT(*) FROM pragma_index_info(il.name)) = 1
              AND (SELECT name FROM pragma_index_info(il.name)) = ?2
        )",
    )?;
    for column in shape.unique {
        let unique: bool =
            stmt.query_row(rusqlite::params![shape.table, column], |row| row.get(0))?;
        if !unique {
            return Err(mismatch(format!("column {}.{column} is not unique", shape.table)));
        }
    }

    Ok(())
}

// ── tests ────────────────────────────────────────────────────────────
