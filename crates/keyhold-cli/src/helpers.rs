//! Shared helpers for the keyhold binary.

use anyhow::{Context, Result};
use keyhold_store::{CredentialStore, StoreConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Open the credential store described by `config`.
pub async fn open_store(config: &StoreConfig) -> Result<CredentialStore> {
    let store = CredentialStore::open(config)
        .await
        .with_context(|| format!("failed to open database {}", config.path.display()))?;
    info!(path = %config.path.display(), "store initialized");
    Ok(store)
}
