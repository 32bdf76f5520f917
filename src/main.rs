//! CLI entry point for the delivery fare estimator.
//!
//! Reads GPS pings for delivery trips from CSV, drops implausible fixes,
//! prices each trip and writes the fares ordered by trip id.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use delivery_fare::config::{DegeneratePolicy, MalformedPolicy, PipelineConfig};
use delivery_fare::geo::DistanceFormula;
use delivery_fare::output::{log_summary, write_fares, write_summary};
use delivery_fare::pipeline::estimate_fares;
use delivery_fare::stats::RunStats;
use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "delivery_fare")]
#[command(about = "Estimate delivery fares from GPS traces", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Price every trip in a CSV of location pings
    Estimate {
        /// CSV with id_delivery,lat,lng,timestamp rows
        #[arg(value_name = "INPUT")]
        input: String,

        /// CSV file to write fares to
        #[arg(short, long, default_value = "fares.csv")]
        output: String,

        /// What to do with rows that fail to parse
        #[arg(long, value_enum, default_value_t = MalformedPolicy::Skip)]
        on_malformed: MalformedPolicy,

        /// How to report trips with fewer than two usable points
        #[arg(long, value_enum, default_value_t = DegeneratePolicy::Zero)]
        degenerate: DegeneratePolicy,

        /// Distance formula
        #[arg(long, value_enum, default_value_t = DistanceFormula::Haversine)]
        distance: DistanceFormula,

        /// Maximum number of trips priced concurrently
        #[arg(short, long, default_value_t = 64)]
        concurrency: usize,

        /// Number of trips buffered between the reader and the pricers
        #[arg(long, default_value_t = 1024)]
        channel_capacity: usize,

        /// Optional: write a JSON run summary to this path
        #[arg(long)]
        summary: Option<String>,
    },
    /// Print the great-circle distance in km between two points
    Distance {
        #[arg(allow_negative_numbers = true)]
        lat1: f64,
        #[arg(allow_negative_numbers = true)]
        lon1: f64,
        #[arg(allow_negative_numbers = true)]
        lat2: f64,
        #[arg(allow_negative_numbers = true)]
        lon2: f64,

        /// Distance formula
        #[arg(long, value_enum, default_value_t = DistanceFormula::Haversine)]
        formula: DistanceFormula,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/delivery_fare.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("delivery_fare.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Estimate {
            input,
            output,
            on_malformed,
            degenerate,
            distance,
            concurrency,
            channel_capacity,
            summary,
        } => {
            let config = PipelineConfig {
                on_malformed,
                degenerate,
                distance,
                concurrency,
                channel_capacity,
            };
            if let Err(e) = estimate(&input, &output, summary.as_deref(), config).await {
                error!(error = %format!("{e:#}"), "Fare estimation failed");
                return Err(e);
            }
        }
        Commands::Distance {
            lat1,
            lon1,
            lat2,
            lon2,
            formula,
        } => {
            let km = formula.distance(lat1, lon1, lat2, lon2);
            info!(km, ?formula, "Distance computed");
            println!("{km:.3}");
        }
    }

    Ok(())
}

/// Prices all trips in `input` and writes them to `output`.
///
/// The fares file is only created once every trip has been priced.
#[tracing::instrument(skip(config))]
async fn estimate(
    input: &str,
    output: &str,
    summary: Option<&str>,
    config: PipelineConfig,
) -> Result<()> {
    let started_at = Utc::now();

    let file = File::open(input).with_context(|| format!("failed to open {input}"))?;
    let run = estimate_fares(BufReader::new(file), config)
        .await
        .with_context(|| format!("failed to estimate fares from {input}"))?;

    write_fares(output, &run.aggregate.fares)?;

    let stats = RunStats::from_run(&run, started_at).with_input(input);
    log_summary(&stats);

    if let Some(path) = summary {
        write_summary(path, &stats)?;
        info!(path, "Run summary written");
    }

    info!(output, trips = stats.trips_written, "Fares written");
    Ok(())
}
