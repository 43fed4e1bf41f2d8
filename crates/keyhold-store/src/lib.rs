//! # keyhold-store
//!
//! Local credential store for keyhold.
//!
//! Keeps one `accounts` table in SQLite and answers two questions:
//! can this identifier be registered, and do these credentials match a
//! registered account.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  CredentialStore (register / verify)    │
//! │  SecretScheme    (plain | pbkdf2)       │
//! ├─────────────────────────────────────────┤
//! │  Database (rusqlite WAL, blocking pool) │
//! │  Migrations (versioned, additive)       │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use keyhold_store::{CredentialStore, StoreConfig};
//!
//! let store = CredentialStore::open(&StoreConfig::at("data/keyhold.db")).await?;
//! assert!(store.register("a@x.com", "p").await?);
//! assert!(store.verify("a@x.com", "p").await?);
//! store.close()?;
//! ```

pub mod account_store;
pub mod config;
pub mod db;
pub mod error;
pub mod migration;
pub mod secret;

// ── re-exports ───────────────────────────────────────────────────────

pub use account_store::{Account, CredentialStore};
pub use config::StoreConfig;
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use secret::SecretScheme;
