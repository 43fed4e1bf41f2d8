//! Error types for the keyhold-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].
//! A duplicate identifier is the only recoverable outcome; every other
//! variant means the store itself could not do its job.

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// An account with this identifier already exists.
    #[error("identifier already registered: {identifier}")]
    IdentifierTaken { identifier: String },

    /// Sealing or checking a secret failed (RNG failure, malformed stored hash).
    #[error("secret error: {0}")]
    Secret(String),

    /// Filesystem error while preparing the database location.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// `close` was called while other clones of the handle are alive.
    #[error("database handle is still shared by {handles} other owner(s)")]
    StillShared { handles: usize },

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl StoreError {
    /// Whether this error means the backing store is unavailable or broken,
    /// as opposed to a duplicate identifier.
    pub fn is_storage_failure(&self) -> bool {
        !matches!(self, Self::IdentifierTaken { .. })
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
