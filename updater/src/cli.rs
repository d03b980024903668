//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ratekeeper_common::Currency;
use ratekeeper_fx::ListQuery;

/// Ratekeeper CLI
#[derive(Parser, Debug)]
#[command(name = "ratekeeper")]
#[command(about = "Keeps a local exchange-rate cache in sync with upstream providers")]
pub struct Args {
    /// JSON config file (defaults to $RATEKEEPER_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Fetch rates from upstream providers now
    Update {
        /// Only run providers with this name (repeatable)
        #[arg(short, long = "source")]
        sources: Vec<String>,
    },

    /// Show the rate for one currency pair, refreshing stale rates first
    Get {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,
    },

    /// List cached rates without refreshing
    Show {
        /// Only this currency
        #[arg(long)]
        currency: Option<Currency>,

        /// Only the N most valuable crypto currencies
        #[arg(long)]
        top: Option<usize>,

        /// Express rates against this currency
        #[arg(long)]
        base: Option<Currency>,
    },

    /// Refresh periodically until Ctrl+C
    Watch {
        /// Seconds between refreshes (overrides config)
        #[arg(long)]
        interval: Option<u64>,
    },
}

impl Command {
    /// Source filter for `update`; `None` runs every provider.
    pub fn source_filter(&self) -> Option<&[String]> {
        match self {
            Command::Update { sources } if !sources.is_empty() => Some(sources.as_slice()),
            _ => None,
        }
    }

    pub fn list_query(&self) -> Option<ListQuery> {
        match self {
            Command::Show {
                currency,
                top,
                base,
            } => Some(ListQuery {
                currency: currency.clone(),
                top: *top,
                base: base.clone(),
            }),
            _ => None,
        }
    }
}
