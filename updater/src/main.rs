//! Ratekeeper updater binary
//!
//! Fetches exchange rates into the local cache and answers queries from it.

use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info};

use ratekeeper_fx::{RateEngine, RateScheduler, SyncConfig};

mod cli;
mod logging;
mod output;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (mut config, warnings) = SyncConfig::load(args.config.as_deref());
    if let Command::Watch {
        interval: Some(secs),
    } = &args.command
    {
        config.refresh_interval_secs = *secs;
    }

    logging::init(&config);
    for warning in &warnings {
        warning.log();
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let engine = Arc::new(RateEngine::from_config(&config)?);

    match &args.command {
        Command::Update { .. } => {
            info!(providers = ?engine.aggregator().provider_names(), "Running update");
            let summary = engine.run(args.command.source_filter()).await?;
            emit(args.json, &summary, output::render_summary)?;
            if summary.is_total_failure() {
                anyhow::bail!("No rates could be fetched");
            }
        }
        Command::Get { from, to } => match engine.get_rate(from, to).await {
            Ok(quote) => emit(args.json, &quote, output::render_quote)?,
            Err(e) => {
                error!(code = e.error_code(), error = %e, "Rate lookup failed");
                return Err(e.into());
            }
        },
        Command::Show { .. } => {
            let query = args.command.list_query().unwrap_or_default();
            let listing = engine.list_rates(&query)?;
            emit(args.json, &listing, output::render_listing)?;
        }
        Command::Watch { .. } => {
            info!("Press Ctrl+C to stop");
            let scheduler = RateScheduler::from_config(engine.clone(), &config);
            let runs = scheduler.run_until(shutdown_signal()).await;
            info!(runs, "Watch stopped");
        }
    }

    Ok(())
}

/// Print `value` as pretty JSON or through `render`.
fn emit<T: Serialize>(json: bool, value: &T, render: fn(&T) -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", render(value));
    }
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, stopping"),
    }
}
