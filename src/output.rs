//! Output formatting and persistence for fares and run statistics.
//!
//! Fares go to CSV, the run summary to logs and optionally to JSON.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::pipeline::FareResult;
use crate::stats::RunStats;
use csv::Writer;
use std::fs::File;
use std::io::Write;

/// Column names of the fares file.
pub const FARES_HEADER: [&str; 2] = ["id_delivery", "fare_estimate"];

/// Writes fares as CSV with a header row, fares rounded to cents.
pub fn write_fares_to<W: Write>(writer: W, fares: &[FareResult]) -> Result<()> {
    let mut writer = Writer::from_writer(writer);

    writer.write_record(FARES_HEADER)?;
    for fare in fares {
        let amount = format!("{:.2}", fare.fare);
        writer.write_record([fare.trip_id.as_str(), amount.as_str()])?;
    }
    writer.flush()?;

    Ok(())
}

/// Creates (or truncates) `path` and writes the fares into it.
pub fn write_fares(path: &str, fares: &[FareResult]) -> Result<()> {
    debug!(path, rows = fares.len(), "Writing fares");

    let file = File::create(path).with_context(|| format!("failed to create {path}"))?;
    write_fares_to(file, fares).with_context(|| format!("failed to write {path}"))
}

/// Logs the run summary as structured fields.
pub fn log_summary(stats: &RunStats) {
    info!(
        records = stats.records_read,
        malformed_skipped = stats.malformed_skipped,
        chunks = stats.chunks,
        points_dropped = stats.points_dropped,
        dropped_pct = stats.dropped_pct(),
        degenerate = stats.degenerate_trips,
        omitted = stats.omitted_trips,
        failed = stats.failures.len(),
        trips = stats.trips_written,
        elapsed_ms = stats.elapsed_ms as u64,
        "Run summary"
    );
}

/// Writes the run summary as pretty-printed JSON.
pub fn write_summary(path: &str, stats: &RunStats) -> Result<()> {
    let json = serde_json::to_string_pretty(stats)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {path}"))?;
    Ok(())
}
