//! Runtime options for a fare estimation run.

use clap::ValueEnum;
use serde::Serialize;

use crate::geo::DistanceFormula;

/// What to do with an input row that fails to parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Log a warning, count the row and keep going.
    #[default]
    Skip,
    /// Stop the run with the first malformed row.
    Abort,
}

/// How to report trips with fewer than two retained points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Write the trip with a fare of zero.
    #[default]
    Zero,
    /// Leave the trip out of the output.
    Omit,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub on_malformed: MalformedPolicy,
    pub degenerate: DegeneratePolicy,
    pub distance: DistanceFormula,
    /// Maximum number of trips priced at the same time.
    pub concurrency: usize,
    /// Chunks buffered between the reader thread and the aggregator.
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            on_malformed: MalformedPolicy::default(),
            degenerate: DegeneratePolicy::default(),
            distance: DistanceFormula::default(),
            concurrency: 64,
            channel_capacity: 1024,
        }
    }
}

impl PipelineConfig {
    /// Clamps zero-sized limits to one so the semaphore and channel stay usable.
    pub fn normalized(mut self) -> Self {
        self.concurrency = self.concurrency.max(1);
        self.channel_capacity = self.channel_capacity.max(1);
        self
    }
}
