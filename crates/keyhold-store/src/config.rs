//! Store configuration.
//!
//! Deserialized from the `[store]` table of the application config file.
//! Every field has a default so a missing table or file is valid.

use std::path::PathBuf;

use serde::Deserialize;

use crate::secret::SecretScheme;

/// Default on-disk location of the credential database.
pub const DEFAULT_DB_PATH: &str = "data/keyhold.db";

/// PBKDF2-HMAC-SHA256 iterations (OWASP 2023).
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

/// How long a connection waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5_000;

/// Settings for opening a [`CredentialStore`](crate::CredentialStore).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the SQLite database file.
    pub path: PathBuf,
    /// Open the database without write access.
    pub read_only: bool,
    /// Scheme used to store secrets of newly registered accounts.
    pub secret_scheme: SecretScheme,
    /// Iteration count for [`SecretScheme::Pbkdf2`].
    pub pbkdf2_iterations: u32,
    /// SQLite `busy_timeout` in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
            read_only: false,
            secret_scheme: SecretScheme::Plain,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    /// Config pointing at `path`, everything else default.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}
