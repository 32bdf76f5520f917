use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::{FareRun, TripFailure};

#[derive(Debug, Default, Serialize)]
pub struct RunStats {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u128,
    pub input: Option<String>,

    // reading
    pub records_read: usize,
    pub malformed_skipped: usize,
    pub chunks: usize,

    // pricing
    pub points_dropped: usize,
    pub degenerate_trips: usize,
    pub omitted_trips: usize,
    pub duplicate_trips: usize,
    pub trips_written: usize,

    pub failures: Vec<TripFailure>,
}

impl RunStats {
    pub fn from_run(run: &FareRun, started_at: DateTime<Utc>) -> Self {
        let aggregate = &run.aggregate;

        RunStats {
            started_at,
            elapsed_ms: (Utc::now() - started_at)
                .to_std()
                .map(|d| d.as_millis())
                .unwrap_or_default(),
            input: None,
            records_read: run.ingest.records_read,
            malformed_skipped: run.ingest.malformed_skipped,
            chunks: aggregate.chunks,
            points_dropped: aggregate.points_dropped,
            degenerate_trips: aggregate.degenerate_trips,
            omitted_trips: aggregate.omitted_trips,
            duplicate_trips: aggregate.duplicate_trips,
            trips_written: aggregate.fares.len(),
            failures: aggregate.failures.clone(),
        }
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Share of parsed records rejected by the speed filter.
    pub fn dropped_pct(&self) -> f64 {
        Self::pct(self.points_dropped, self.records_read)
    }

    /// Set the input the run read from
    pub fn with_input(mut self, input: &str) -> Self {
        self.input = Some(input.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{AggregateReport, FareResult, IngestReport};

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(RunStats::pct(10, 0), 0.0);
    }

    #[test]
    fn test_pct_normal_values() {
        assert_eq!(RunStats::pct(50, 100), 50.0);
        assert_eq!(RunStats::pct(1, 4), 25.0);
    }

    #[test]
    fn test_from_run_copies_counters() {
        let run = FareRun {
            ingest: IngestReport {
                records_read: 8,
                malformed_skipped: 1,
                chunks_produced: 3,
            },
            aggregate: AggregateReport {
                fares: vec![FareResult {
                    trip_id: "1".to_string(),
                    fare: 3.47,
                }],
                chunks: 3,
                points_dropped: 2,
                degenerate_trips: 2,
                omitted_trips: 2,
                ..Default::default()
            },
        };

        let stats = RunStats::from_run(&run, Utc::now()).with_input("trips.csv");

        assert_eq!(stats.records_read, 8);
        assert_eq!(stats.malformed_skipped, 1);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.trips_written, 1);
        assert_eq!(stats.dropped_pct(), 25.0);
        assert_eq!(stats.input.as_deref(), Some("trips.csv"));
    }
}
