//! Trip grouping, point filtering and fare computation.
//!
//! A blocking reader thread turns CSV rows into chunks and hands them to the
//! [`Aggregator`] over a bounded channel; the aggregator prices each chunk in
//! its own task and returns fares ordered by trip id.

pub mod aggregate;
pub mod chunker;
pub mod fare;
pub mod filter;
pub mod types;

pub use aggregate::{
    AggregateReport, Aggregator, Pricer, PricedTrip, TariffPricer, TripFailure, TripKey,
};
pub use chunker::{Chunks, TripChunker, process_stream};
pub use fare::{FareBreakdown, FareEngine};
pub use filter::PointFilter;
pub use types::{Chunk, FareResult, FilteredChunk, LocationRecord};

use std::io::Read;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::{MalformedPolicy, PipelineConfig};
use crate::error::PipelineError;
use crate::parser::RecordReader;

/// Filters and prices one chunk with the default distance formula.
pub fn compute_fare(chunk: Chunk) -> FareResult {
    TariffPricer::default().price(chunk).result
}

/// Counters from the reading side of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub records_read: usize,
    pub malformed_skipped: usize,
    pub chunks_produced: usize,
}

/// Outcome of a complete run.
#[derive(Debug, Default)]
pub struct FareRun {
    pub ingest: IngestReport,
    pub aggregate: AggregateReport,
}

/// Reads rows, applies the malformed-row policy and sends chunks downstream.
///
/// Returns early without error if the receiving side has gone away.
fn produce_chunks<R: Read>(
    input: R,
    on_malformed: MalformedPolicy,
    tx: &mpsc::Sender<Chunk>,
) -> Result<IngestReport, PipelineError> {
    let mut report = IngestReport::default();
    let mut chunker = TripChunker::new();

    for row in RecordReader::new(input) {
        let record = match row {
            Ok(record) => record,
            Err(PipelineError::MalformedRecord(e)) if on_malformed == MalformedPolicy::Skip => {
                warn!(line = e.line, defect = %e.defect, "Skipping malformed record");
                report.malformed_skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        report.records_read += 1;

        if let Some(chunk) = chunker.push(record) {
            report.chunks_produced += 1;
            if tx.blocking_send(chunk).is_err() {
                debug!("Chunk receiver closed, stopping reader");
                return Ok(report);
            }
        }
    }

    if let Some(chunk) = chunker.finish() {
        report.chunks_produced += 1;
        if tx.blocking_send(chunk).is_err() {
            debug!("Chunk receiver closed before the last chunk");
        }
    }

    Ok(report)
}

/// Runs the whole pipeline over CSV `input`.
///
/// # Errors
///
/// Fails on an I/O error, on a malformed row under [`MalformedPolicy::Abort`],
/// or on a trip id that is not an integer.
pub async fn estimate_fares<R>(input: R, config: PipelineConfig) -> Result<FareRun, PipelineError>
where
    R: Read + Send + 'static,
{
    let pricer = TariffPricer::new(config.distance);
    estimate_fares_with(input, config, pricer).await
}

/// [`estimate_fares`] with a custom [`Pricer`].
///
/// When the reader fails, trips not yet priced are dropped and the reader's
/// error is returned.
#[tracing::instrument(skip(input, pricer))]
pub async fn estimate_fares_with<R, P>(
    input: R,
    config: PipelineConfig,
    pricer: P,
) -> Result<FareRun, PipelineError>
where
    R: Read + Send + 'static,
    P: Pricer,
{
    let config = config.normalized();
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let (halt_tx, halt_rx) = oneshot::channel();

    let on_malformed = config.on_malformed;
    let producer = tokio::task::spawn_blocking(move || {
        let ingested = produce_chunks(input, on_malformed, &tx);
        // must fire before the channel closes
        if ingested.is_err() && halt_tx.send(()).is_err() {
            debug!("Aggregator already finished");
        }
        drop(tx);
        ingested
    });

    let aggregated = Aggregator::new(pricer, &config).run_until(rx, halt_rx).await;
    let ingested = producer
        .await
        .map_err(|e| PipelineError::Producer(e.to_string()))?;

    let (ingest, aggregate) = match (ingested, aggregated) {
        (Ok(ingest), Ok(aggregate)) => (ingest, aggregate),
        (Err(e), Ok(_) | Err(PipelineError::Halted)) => return Err(e),
        (_, Err(e)) => return Err(e),
    };

    info!(
        records = ingest.records_read,
        malformed = ingest.malformed_skipped,
        chunks = ingest.chunks_produced,
        trips = aggregate.fares.len(),
        "Fare estimation finished"
    );

    Ok(FareRun { ingest, aggregate })
}
