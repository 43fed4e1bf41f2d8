//! Account persistence: registration and credential verification.
//!
//! Accounts are keyed by their identifier (an email address), compared
//! exactly as given. The `UNIQUE` constraint on `accounts.identifier` makes
//! the duplicate check and the insert a single atomic statement. Accounts
//! are never updated or deleted.

use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::{debug, info, instrument, warn};

use crate::config::StoreConfig;
use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::secret::{self, SecretScheme};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A registered account. The secret is never part of this view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Surrogate key assigned by the store, never reused.
    pub id: i64,
    /// Email address the account was registered with.
    pub identifier: String,
    /// How the secret is stored.
    pub secret_scheme: SecretScheme,
    /// Unix timestamp of registration.
    pub created_at: i64,
}

// ═══════════════════════════════════════════════════════════════════════
//  CredentialStore
// ═══════════════════════════════════════════════════════════════════════

/// Registration and login checks over the `accounts` table.
#[derive(Clone)]
pub struct CredentialStore {
    db: Database,
    scheme: SecretScheme,
    pbkdf2_iterations: u32,
}

impl CredentialStore {
    /// Create a store over an already migrated `db`, storing new secrets
    /// verbatim.
    pub fn new(db: Database) -> Self {
        let defaults = StoreConfig::default();
        Self {
            db,
            scheme: defaults.secret_scheme,
            pbkdf2_iterations: defaults.pbkdf2_iterations,
        }
    }

    /// Use `scheme` for secrets of accounts registered from now on.
    pub fn with_scheme(mut self, scheme: SecretScheme, pbkdf2_iterations: u32) -> Self {
        self.scheme = scheme;
        self.pbkdf2_iterations = pbkdf2_iterations;
        self
    }

    /// Open the database described by `config` and bring its schema up to
    /// date.
    ///
    /// Read-only stores are not migrated.
    pub async fn open(config: &StoreConfig) -> StoreResult<Self> {
        let owned = config.clone();
        let db = tokio::task::spawn_blocking(move || Database::open_with(&owned)).await??;
        if !config.read_only {
            db.run_migrations().await?;
        }

        info!(
            path = %config.path.display(),
            scheme = %config.secret_scheme,
            read_only = config.read_only,
            "credential store ready"
        );
        Ok(Self::new(db).with_scheme(config.secret_scheme, config.pbkdf2_iterations))
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Close the store, releasing the database connection.
    pub fn close(self) -> StoreResult<()> {
        self.db.close()
    }

    /// Register a new account.
    ///
    /// Returns `Ok(true)` when the account was stored and `Ok(false)` when
    /// the identifier is already registered. Any other failure is an error.
    #[instrument(skip(self, secret))]
    pub async fn register(&self, identifier: &str, secret: &str) -> StoreResult<bool> {
        match self.create(identifier, secret).await {
            Ok(_) => Ok(true),
            Err(StoreError::IdentifierTaken { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Register a new account and return it.
    ///
    /// Fails with [`StoreError::IdentifierTaken`] if the identifier is
    /// already registered; the existing account is left untouched.
    #[instrument(skip(self, secret))]
    pub async fn create(&self, identifier: &str, secret: &str) -> StoreResult<Account> {
        let identifier = identifier.to_string();
        let scheme = self.scheme;
        let iterations = self.pbkdf2_iterations;
        let secret = secret.to_string();
        let now = Utc::now().timestamp();

        // Sealing under pbkdf2 is CPU-bound. It runs on its own blocking task
        // so the connection lock is only held for the insert.
        let stored =
            tokio::task::spawn_blocking(move || secret::seal(&secret, scheme, iterations))
                .await??;

        let account = self
            .db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO accounts (identifier, secret, secret_scheme, created_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![identifier, stored, scheme.as_str(), now],
                )
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        return StoreError::IdentifierTaken {
                            identifier: identifier.clone(),
                        };
                    }
                    StoreError::Sqlite(e)
                })?;

                Ok(Account {
                    id: conn.last_insert_rowid(),
                    identifier,
                    secret_scheme: scheme,
                    created_at: now,
                })
            })
            .await;

        match &account {
            Ok(account) => debug!(account_id = account.id, "account registered"),
            Err(StoreError::IdentifierTaken { .. }) => debug!("identifier already registered"),
            Err(err) => warn!(%err, "account registration failed"),
        }
        account
    }

    /// Check a login attempt.
    ///
    /// Returns `Ok(true)` only when an account with exactly this identifier
    /// exists and its secret matches exactly. An unknown identifier and a
    /// wrong secret both yield `Ok(false)`.
    #[instrument(skip(self, secret))]
    pub async fn verify(&self, identifier: &str, secret: &str) -> StoreResult<bool> {
        let identifier = identifier.to_string();
        let secret = secret.to_string();

        let verified = self
            .db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT secret, secret_scheme FROM accounts WHERE identifier = ?1",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![identifier], |row| {
                        Ok(SecretRow {
                            secret: row.get(0)?,
                            scheme: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                for row in rows {
                    let scheme = SecretScheme::parse(&row.scheme)?;
                    if secret::matches(&row.secret, scheme, &secret)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            })
            .await;

        match &verified {
            Ok(ok) => debug!(verified = ok, "credentials checked"),
            Err(err) => warn!(%err, "credential check failed"),
        }
        verified
    }

    /// Fetch an account by identifier, returning `None` if not registered.
    #[instrument(skip(self))]
    pub async fn find(&self, identifier: &str) -> StoreResult<Option<Account>> {
        let identifier = identifier.to_string();
        self.db
            .execute(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, identifier, secret_scheme, created_at \
                         FROM accounts WHERE identifier = ?1",
                        rusqlite::params![identifier],
                        |row| {
                            Ok(AccountRow {
                                id: row.get(0)?,
                                identifier: row.get(1)?,
                                secret_scheme: row.get(2)?,
                                created_at: row.get(3)?,
                            })
                        },
                    )
                    .optional()?;
                row.map(AccountRow::into_account).transpose()
            })
            .await
    }

    /// Return the total number of accounts.
    #[instrument(skip(self))]
    pub async fn count(&self) -> StoreResult<i64> {
        self.db
            .execute(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// ═══════════════════════════════════════════════════════════════════════
//  Internal row mapping
// ═══════════════════════════════════════════════════════════════════════

/// Raw account row before scheme parsing.
struct AccountRow {
    id: i64,
    identifier: String,
    secret_scheme: String,
    created_at: i64,
}

impl AccountRow {
    fn into_account(self) -> StoreResult<Account> {
        Ok(Account {
            id: self.id,
            identifier: self.identifier,
            secret_scheme: SecretScheme::parse(&self.secret_scheme)?,
            created_at: self.created_at,
        })
    }
}

/// Stored secret and the scheme it was sealed with.
struct SecretRow {
    secret: String,
    scheme: String,
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Create an in-memory database with all tables for testing.
    async fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    async fn setup_store() -> CredentialStore {
        CredentialStore::new(setup_db().await)
    }

    #[tokio::test]
    async fn register_then_verify() {
        let store = setup_store().await;

        assert!(store.register("a@x.com", "p").await.unwrap());
        assert!(store.verify("a@x.com", "p").await.unwrap());
        assert!(!store.verify("a@x.com", "wrong").await.unwrap());
        assert!(!store.verify("b@x.com", "p").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_register_keeps_first_secret() {
        let store = setup_store().await;

        assert!(store.register("a@x.com", "first").await.unwrap());
        assert!(!store.register("a@x.com", "second").await.unwrap());

        assert!(store.verify("a@x.com", "first").await.unwrap());
        assert!(!store.verify("a@x.com", "second").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn create_reports_identifier_taken() {
        let store = setup_store().await;

        store.create("a@x.com", "p").await.unwrap();
        let err = store.create("a@x.com", "q").await.unwrap_err();

        assert!(matches!(
            err,
            StoreError::IdentifierTaken { ref identifier } if identifier == "a@x.com"
        ));
        assert!(!err.is_storage_failure());
    }

    #[tokio::test]
    async fn identifiers_are_case_sensitive() {
        let store = setup_store().await;

        assert!(store.register("A@x.com", "p").await.unwrap());
        assert!(!store.verify("a@x.com", "p").await.unwrap());
        // Differently cased identifiers are distinct accounts.
        assert!(store.register("a@x.com", "p").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn secrets_are_compared_without_trimming() {
        let store = setup_store().await;

        store.register("a@x.com", " pad ").await.unwrap();
        assert!(store.verify("a@x.com", " pad ").await.unwrap());
        assert!(!store.verify("a@x.com", "pad").await.unwrap());
        assert!(!store.verify(" a@x.com", " pad ").await.unwrap());
    }

    #[tokio::test]
    async fn empty_values_are_accepted_by_the_store() {
        let store = setup_store().await;

        assert!(store.register("", "").await.unwrap());
        assert!(store.verify("", "").await.unwrap());
        assert!(!store.register("", "other").await.unwrap());
    }

    #[tokio::test]
    async fn ids_increase_and_are_not_reused() {
        let store = setup_store().await;

        let first = store.create("a@x.com", "p").await.unwrap();
        let _ = store.create("a@x.com", "p").await.unwrap_err();
        let second = store.create("b@x.com", "p").await.unwrap();

        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn find_returns_account_without_secret() {
        let store = setup_store().await;

        let created = store.create("a@x.com", "p").await.unwrap();
        let found = store.find("a@x.com").await.unwrap().unwrap();

        assert_eq!(found, created);
        assert_eq!(found.secret_scheme, SecretScheme::Plain);
        assert!(store.find("b@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pbkdf2_scheme_seals_and_verifies() {
        let db = setup_db().await;
        let store = CredentialStore::new(db.clone()).with_scheme(SecretScheme::Pbkdf2, 1_000);

        assert!(store.register("a@x.com", "hunter2").await.unwrap());
        assert!(store.verify("a@x.com", "hunter2").await.unwrap());
        assert!(!store.verify("a@x.com", "hunter3").await.unwrap());

        let stored: String = db
            .execute(|conn| {
                let s = conn.query_row(
                    "SELECT secret FROM accounts WHERE identifier = 'a@x.com'",
                    [],
                    |row| row.get(0),
                )?;
                Ok(s)
            })
            .await
            .unwrap();
        assert_ne!(stored, "hunter2");
    }

    #[tokio::test]
    async fn mixed_schemes_in_one_store() {
        let db = setup_db().await;
        let plain = CredentialStore::new(db.clone());
        let hashed = CredentialStore::new(db).with_scheme(SecretScheme::Pbkdf2, 1_000);

        plain.register("old@x.com", "p1").await.unwrap();
        hashed.register("new@x.com", "p2").await.unwrap();

        // Either handle verifies either row: the stored scheme decides.
        assert!(hashed.verify("old@x.com", "p1").await.unwrap());
        assert!(plain.verify("new@x.com", "p2").await.unwrap());
        assert_eq!(
            plain.find("new@x.com").await.unwrap().unwrap().secret_scheme,
            SecretScheme::Pbkdf2
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn verify_does_not_wait_for_pbkdf2_sealing() {
        let db = setup_db().await;
        let plain = CredentialStore::new(db.clone());
        let slow = CredentialStore::new(db).with_scheme(SecretScheme::Pbkdf2, 1_000_000);
        plain.register("a@x.com", "p").await.unwrap();

        let sealing = tokio::spawn(async move { slow.register("b@x.com", "hunter2").await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // The connection is free while the hash is derived.
        assert!(plain.verify("a@x.com", "p").await.unwrap());
        assert_eq!(plain.count().await.unwrap(), 1);
        assert!(!sealing.is_finished());

        assert!(sealing.await.unwrap().unwrap());
        assert_eq!(plain.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn duplicate_pbkdf2_register_leaves_first_row() {
        let db = setup_db().await;
        let store = CredentialStore::new(db).with_scheme(SecretScheme::Pbkdf2, 1_000);

        assert!(store.register("a@x.com", "first").await.unwrap());
        assert!(!store.register("a@x.com", "second").await.unwrap());
        assert!(store.verify("a@x.com", "first").await.unwrap());
        assert!(!store.verify("a@x.com", "second").await.unwrap());
    }

    #[tokio::test]
    async fn verify_without_schema_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        let store = CredentialStore::new(db);

        let err = store.verify("a@x.com", "p").await.unwrap_err();
        assert!(err.is_storage_failure());

        let err = store.register("a@x.com", "p").await.unwrap_err();
        assert!(err.is_storage_failure());
    }

    #[tokio::test]
    async fn query_only_connection_rejects_register() {
        let db = setup_db().await;
        db.execute(|conn| {
            conn.pragma_update(None, "query_only", "ON")?;
            Ok(())
        })
        .await
        .unwrap();
        let store = CredentialStore::new(db);

        let err = store.register("a@x.com", "p").await.unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
        assert!(!store.verify("a@x.com", "p").await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_stored_hash_is_an_error_not_a_mismatch() {
        let db = setup_db().await;
        db.execute(|conn| {
            conn.execute(
                "INSERT INTO accounts (identifier, secret, secret_scheme, created_at) \
                 VALUES ('a@x.com', 'garbage', 'pbkdf2', 0)",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();
        let store = CredentialStore::new(db);

        let err = store.verify("a@x.com", "p").await.unwrap_err();
        assert!(matches!(err, StoreError::Secret(_)));
    }
}
