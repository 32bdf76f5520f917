//! Concurrent per-trip pricing with deterministic output order.
//!
//! Every chunk becomes its own task. Tasks finish in any order; the final
//! report is sorted by numeric trip id.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tokio::task::{self, JoinError, JoinSet};
use tracing::{Instrument, debug, error, info, warn};

use crate::config::{DegeneratePolicy, PipelineConfig};
use crate::error::{InvalidTripIdentifierError, PipelineError};
use crate::geo::DistanceFormula;
use crate::pipeline::fare::{FareBreakdown, FareEngine};
use crate::pipeline::filter::PointFilter;
use crate::pipeline::types::{Chunk, FareResult};

/// A chunk after filtering and pricing.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedTrip {
    pub result: FareResult,
    pub points: usize,
    pub dropped: usize,
    pub breakdown: FareBreakdown,
}

impl PricedTrip {
    pub fn is_degenerate(&self) -> bool {
        self.points - self.dropped < 2
    }
}

/// Turns one chunk into a fare. Runs on the blocking pool.
pub trait Pricer: Send + Sync + 'static {
    fn price(&self, chunk: Chunk) -> PricedTrip;
}

/// Speed filter followed by the standard tariff.
#[derive(Debug, Clone, Copy, Default)]
pub struct TariffPricer {
    filter: PointFilter,
    engine: FareEngine,
}

impl TariffPricer {
    pub fn new(formula: DistanceFormula) -> Self {
        Self {
            filter: PointFilter::new(formula),
            engine: FareEngine::new(formula),
        }
    }
}

impl Pricer for TariffPricer {
    fn price(&self, chunk: Chunk) -> PricedTrip {
        let points = chunk.len();
        let filtered = self.filter.filter(chunk);
        let breakdown = self.engine.breakdown(&filtered);

        PricedTrip {
            result: FareResult {
                trip_id: filtered.trip_id().to_string(),
                fare: breakdown.total,
            },
            points,
            dropped: filtered.dropped(),
            breakdown,
        }
    }
}

/// A trip whose task did not complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripFailure {
    pub trip_id: String,
    pub reason: String,
}

/// Everything the aggregator learned from one run.
#[derive(Debug, Default)]
pub struct AggregateReport {
    /// Sorted by ascending numeric trip id.
    pub fares: Vec<FareResult>,
    pub chunks: usize,
    pub points_dropped: usize,
    pub degenerate_trips: usize,
    pub omitted_trips: usize,
    pub duplicate_trips: usize,
    pub failures: Vec<TripFailure>,
}

enum TaskOutcome {
    Priced { trip: PricedTrip, stored: bool, replaced: bool },
    Failed(TripFailure),
}

/// Ordering key for a trip id.
///
/// Ids compare by integer value, then by their raw text, so `"1"` and `"01"`
/// stay distinct trips. The value is kept as a digit string and has no width
/// limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripKey {
    negative: bool,
    /// Magnitude without leading zeros; `"0"` for zero.
    digits: String,
    raw: String,
}

impl TripKey {
    /// Accepts an optional sign followed by one or more ASCII digits.
    pub fn parse(trip_id: &str) -> Result<Self, InvalidTripIdentifierError> {
        let (negative, unsigned) = match trip_id.as_bytes().first() {
            Some(b'-') => (true, &trip_id[1..]),
            Some(b'+') => (false, &trip_id[1..]),
            _ => (false, trip_id),
        };
        if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidTripIdentifierError {
                trip_id: trip_id.to_string(),
            });
        }

        let digits = match unsigned.trim_start_matches('0') {
            "" => "0",
            trimmed => trimmed,
        };
        Ok(Self {
            negative: negative && digits != "0",
            digits: digits.to_string(),
            raw: trip_id.to_string(),
        })
    }

    pub fn trip_id(&self) -> &str {
        &self.raw
    }

    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        self.digits
            .len()
            .cmp(&other.digits.len())
            .then_with(|| self.digits.cmp(&other.digits))
    }
}

impl Ord for TripKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let numeric = match (self.negative, other.negative) {
            (false, false) => self.cmp_magnitude(other),
            (true, true) => other.cmp_magnitude(self),
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
        };
        numeric.then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for TripKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fired by the chunk producer when it fails, so pending trips are dropped.
struct Halt {
    signal: oneshot::Receiver<()>,
    armed: bool,
}

impl Halt {
    fn new(signal: oneshot::Receiver<()>) -> Self {
        Self { signal, armed: true }
    }

    /// Resolves once the signal fires. Pends forever if the sender is
    /// dropped without firing.
    async fn fired(&mut self) {
        if self.armed {
            if (&mut self.signal).await.is_ok() {
                return;
            }
            self.armed = false;
        }
        std::future::pending::<()>().await
    }

    fn fired_now(&mut self) -> bool {
        self.armed && self.signal.try_recv().is_ok()
    }
}

/// Tasks in flight and the trip each one is pricing.
#[derive(Default)]
struct InFlight {
    set: JoinSet<TaskOutcome>,
    trips: HashMap<task::Id, String>,
}

impl InFlight {
    fn halt(&mut self) -> PipelineError {
        warn!(pending = self.set.len(), "Reader failed, aborting pending trips");
        self.set.abort_all();
        PipelineError::Halted
    }
}

pub struct Aggregator<P> {
    pricer: Arc<P>,
    degenerate: DegeneratePolicy,
    permits: Arc<Semaphore>,
    results: Arc<Mutex<BTreeMap<TripKey, FareResult>>>,
}

impl Aggregator<TariffPricer> {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(TariffPricer::new(config.distance), config)
    }
}

impl<P: Pricer> Aggregator<P> {
    pub fn new(pricer: P, config: &PipelineConfig) -> Self {
        Self {
            pricer: Arc::new(pricer),
            degenerate: config.degenerate,
            permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
            results: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Prices every chunk received until the channel closes.
    pub async fn run(self, chunks: mpsc::Receiver<Chunk>) -> Result<AggregateReport, PipelineError> {
        let (_never, halt) = oneshot::channel();
        self.run_until(chunks, halt).await
    }

    /// Like [`Aggregator::run`], but stops early when `halt` fires.
    ///
    /// A non-numeric trip id or a fired halt stops the run: pending tasks are
    /// aborted and the channel is dropped so the producer stops too. A halted
    /// run returns [`PipelineError::Halted`].
    #[tracing::instrument(skip_all)]
    pub async fn run_until(
        self,
        mut chunks: mpsc::Receiver<Chunk>,
        halt: oneshot::Receiver<()>,
    ) -> Result<AggregateReport, PipelineError> {
        let mut halt = Halt::new(halt);
        let mut tasks = InFlight::default();
        let mut report = AggregateReport::default();

        loop {
            tokio::select! {
                biased;
                () = halt.fired() => return Err(tasks.halt()),
                received = chunks.recv() => {
                    let Some(chunk) = received else { break };
                    report.chunks += 1;

                    let key = match TripKey::parse(chunk.trip_id()) {
                        Ok(key) => key,
                        Err(e) => {
                            error!(trip_id = %e.trip_id, "Aborting run on invalid trip id");
                            tasks.set.abort_all();
                            return Err(e.into());
                        }
                    };

                    let permit = tokio::select! {
                        biased;
                        () = halt.fired() => return Err(tasks.halt()),
                        permit = self.permits.clone().acquire_owned() => match permit {
                            Ok(permit) => Some(permit),
                            Err(e) => {
                                warn!(error = %e, "Concurrency limit unavailable, pricing without permit");
                                None
                            }
                        },
                    };
                    self.dispatch(&mut tasks, key, chunk, permit);
                }
                Some(joined) = tasks.set.join_next_with_id(), if !tasks.set.is_empty() => {
                    tally(&mut report, &mut tasks.trips, joined);
                }
            }
        }

        // the halt may have fired just before the channel closed
        if halt.fired_now() {
            return Err(tasks.halt());
        }

        while let Some(joined) = tasks.set.join_next_with_id().await {
            tally(&mut report, &mut tasks.trips, joined);
        }

        report.fares = std::mem::take(&mut *self.results.lock().await)
            .into_values()
            .collect();

        info!(
            chunks = report.chunks,
            trips = report.fares.len(),
            failed = report.failures.len(),
            "Aggregation complete"
        );
        Ok(report)
    }

    fn dispatch(
        &self,
        tasks: &mut InFlight,
        key: TripKey,
        chunk: Chunk,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        let trip_id = chunk.trip_id().to_string();
        let span = tracing::info_span!("price_trip", trip_id = %trip_id, points = chunk.len());

        let pricer = self.pricer.clone();
        let results = self.results.clone();
        let degenerate = self.degenerate;
        let failed_trip = trip_id.clone();

        let handle = tasks.set.spawn(
            async move {
                let _permit = permit;
                let priced = tokio::task::spawn_blocking(move || pricer.price(chunk)).await;

                let trip = match priced {
                    Ok(trip) => trip,
                    Err(e) => {
                        error!(error = %e, "Pricing task failed");
                        return TaskOutcome::Failed(TripFailure {
                            trip_id: failed_trip,
                            reason: e.to_string(),
                        });
                    }
                };

                debug!(
                    fare = trip.result.fare,
                    dropped = trip.dropped,
                    breakdown = ?trip.breakdown,
                    "Trip priced"
                );

                if trip.is_degenerate() && degenerate == DegeneratePolicy::Omit {
                    return TaskOutcome::Priced {
                        trip,
                        stored: false,
                        replaced: false,
                    };
                }

                let replaced = results.lock().await.insert(key, trip.result.clone()).is_some();
                if replaced {
                    warn!("Trip id seen in more than one chunk, keeping the latest result");
                }

                TaskOutcome::Priced {
                    trip,
                    stored: true,
                    replaced,
                }
            }
            .instrument(span),
        );
        tasks.trips.insert(handle.id(), trip_id);
    }
}

fn tally(
    report: &mut AggregateReport,
    trips: &mut HashMap<task::Id, String>,
    joined: Result<(task::Id, TaskOutcome), JoinError>,
) {
    match joined {
        Ok((id, outcome)) => {
            trips.remove(&id);
            match outcome {
                TaskOutcome::Priced {
                    trip,
                    stored,
                    replaced,
                } => {
                    report.points_dropped += trip.dropped;
                    if trip.is_degenerate() {
                        report.degenerate_trips += 1;
                    }
                    if !stored {
                        report.omitted_trips += 1;
                    }
                    if replaced {
                        report.duplicate_trips += 1;
                    }
                }
                TaskOutcome::Failed(failure) => report.failures.push(failure),
            }
        }
        Err(e) => {
            let trip_id = trips.remove(&e.id()).unwrap_or_default();
            error!(trip_id = %trip_id, error = %e, "Trip task did not complete");
            report.failures.push(TripFailure {
                trip_id,
                reason: e.to_string(),
            });
        }
    }
}
