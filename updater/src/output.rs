//! Human-readable rendering of engine results.

use std::fmt::Write;

use ratekeeper_common::format_timestamp;
use ratekeeper_fx::{RateListing, RateQuote, RunSummary};

pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();

    if summary.is_total_failure() {
        let _ = writeln!(out, "Update completed with errors, no rates were fetched.");
    } else {
        let _ = writeln!(
            out,
            "Update successful. Total rates updated: {}.",
            summary.pairs_updated
        );
    }

    for (name, count) in &summary.succeeded {
        let _ = writeln!(out, "  {:<20} ok      {} rates", name, count);
    }
    for (name, reason) in &summary.failed {
        let _ = writeln!(out, "  {:<20} failed  {}", name, reason);
    }
    for name in &summary.skipped {
        let _ = writeln!(out, "  {:<20} skipped", name);
    }

    out
}

pub fn render_quote(quote: &RateQuote) -> String {
    format!(
        "Rate {from}->{to}: {rate:.8} (updated at {at})\nReverse rate {to}->{from}: {reverse:.8}\n",
        from = quote.from,
        to = quote.to,
        rate = quote.rate,
        reverse = quote.reverse_rate,
        at = format_timestamp(&quote.updated_at),
    )
}

pub fn render_listing(listing: &RateListing) -> String {
    let updated = listing
        .last_refresh
        .as_ref()
        .map(format_timestamp)
        .unwrap_or_else(|| "unknown".to_string());

    let rows: Vec<(&str, String)> = listing
        .rows
        .iter()
        .map(|row| (row.pair.as_str(), format!("{:.5}", row.rate)))
        .collect();
    let pair_width = rows.iter().map(|(p, _)| p.len()).max().unwrap_or(0).max(4);
    let rate_width = rows.iter().map(|(_, r)| r.len()).max().unwrap_or(0).max(4);

    let mut out = String::new();
    let _ = writeln!(out, "Rates from cache (updated at {}):", updated);
    let _ = writeln!(out, "{:<pw$}  {:>rw$}", "Pair", "Rate", pw = pair_width, rw = rate_width);
    let _ = writeln!(out, "{}  {}", "-".repeat(pair_width), "-".repeat(rate_width));
    for (pair, rate) in rows {
        let _ = writeln!(out, "{:<pw$}  {:>rw$}", pair, rate, pw = pair_width, rw = rate_width);
    }
    out
}
