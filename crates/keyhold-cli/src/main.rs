//! CLI entry point for keyhold.
//!
//! This binary provides the `keyhold` command with subcommands for
//! initializing the store, registering accounts, checking logins, and an
//! interactive shell.

mod cli;
mod config;
mod form;
mod gateway;
mod helpers;
mod messages;
mod shell;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use keyhold_store::StoreConfig;
use tracing::{error, info};

use crate::cli::{Cli, Commands};
use crate::form::Credentials;
use crate::gateway::{AuthGateway, AuthOutcome, AuthRequest};
use crate::helpers::{init_tracing, open_store};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing("info");

    let config = config::load(&cli.config, cli.db).context("failed to load configuration")?;

    match cli.command {
        Commands::Init => cmd_init(&config).await,
        Commands::Register { identifier, secret } => {
            cmd_request(&config, Credentials::new(identifier, secret).map(AuthRequest::Register))
                .await
        }
        Commands::Verify { identifier, secret } => {
            cmd_request(&config, Credentials::new(identifier, secret).map(AuthRequest::Login)).await
        }
        Commands::Status => cmd_status(&config).await,
        Commands::Shell => cmd_shell(&config).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn cmd_init(config: &StoreConfig) -> Result<ExitCode> {
    let store = open_store(config).await?;
    let version = store.database().schema_version().await?;
    store.close().context("failed to close database")?;

    println!("  {} ready (schema v{version})", config.path.display());
    Ok(ExitCode::SUCCESS)
}

/// Run a single register or verify request through the gateway.
async fn cmd_request(
    config: &StoreConfig,
    request: Result<AuthRequest, form::FormError>,
) -> Result<ExitCode> {
    let request = match request {
        Ok(request) => request,
        Err(e) => {
            eprintln!("  {}", messages::form_message(e));
            return Ok(ExitCode::from(2));
        }
    };

    let mut gateway = AuthGateway::new(open_store(config).await?);
    gateway.submit(request);
    let event = gateway
        .next()
        .await
        .context("request finished without a result")?;
    gateway.shutdown().await.context("failed to close database")?;

    let outcome = event.outcome;
    if let AuthOutcome::StorageFailed(reason) = &outcome {
        error!(request_id = event.request_id, %reason, "request hit a storage failure");
    } else {
        info!(request_id = event.request_id, success = outcome.is_success(), "request finished");
    }

    println!("  {}", messages::outcome_message(&outcome));
    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_status(config: &StoreConfig) -> Result<ExitCode> {
    let store = open_store(config).await?;
    let version = store.database().schema_version().await?;
    let accounts = store.count().await?;
    store.close().context("failed to close database")?;

    println!();
    println!("  keyhold status");
    println!("    Database:       {}", config.path.display());
    println!("    Secret scheme:  {}", config.secret_scheme);
    println!("    Schema version: {version}");
    println!("    Accounts:       {accounts}");
    println!();
    Ok(ExitCode::SUCCESS)
}

async fn cmd_shell(config: &StoreConfig) -> Result<ExitCode> {
    let mut gateway = AuthGateway::new(open_store(config).await?);

    shell::run(&mut gateway).await?;

    gateway.shutdown().await.context("failed to close database")?;
    info!("shell closed");
    Ok(ExitCode::SUCCESS)
}
