//! CLI argument definitions for keyhold.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// keyhold -- local account registration and login checks.
#[derive(Parser)]
#[command(
    name = "keyhold",
    version,
    about = "keyhold -- local account registration and login checks",
    long_about = "Registers accounts keyed by email address in a local SQLite store \
                  and checks login attempts against them."
)]
pub struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Database path, overriding the config file and KEYHOLD_DB.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database or bring its schema up to date.
    Init,

    /// Register a new account.
    Register {
        /// Email address identifying the account.
        identifier: String,
        /// Secret for the new account.
        #[arg(long, short)]
        secret: String,
    },

    /// Check a login attempt.
    Verify {
        /// Email address identifying the account.
        identifier: String,
        /// Secret to check.
        #[arg(long, short)]
        secret: String,
    },

    /// Show database location, schema version and account count.
    Status,

    /// Interactive register/login prompt.
    Shell,
}
