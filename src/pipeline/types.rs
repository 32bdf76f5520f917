//! Data types flowing through the fare pipeline.

use serde::Serialize;

/// A single GPS fix for a trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationRecord {
    pub trip_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

impl LocationRecord {
    pub fn new(trip_id: impl Into<String>, latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            trip_id: trip_id.into(),
            latitude,
            longitude,
            timestamp,
        }
    }
}

/// A maximal contiguous run of records sharing one trip id. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    records: Vec<LocationRecord>,
}

impl Chunk {
    pub fn new(first: LocationRecord) -> Self {
        Self {
            records: vec![first],
        }
    }

    /// Appends `record` if it belongs to this trip, otherwise hands it back.
    pub fn push(&mut self, record: LocationRecord) -> Result<(), LocationRecord> {
        if record.trip_id == self.trip_id() {
            self.records.push(record);
            Ok(())
        } else {
            Err(record)
        }
    }

    pub fn trip_id(&self) -> &str {
        &self.records[0].trip_id
    }

    pub fn records(&self) -> &[LocationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<LocationRecord> {
        self.records
    }
}

/// The records of a chunk that survived the speed filter, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredChunk {
    pub(crate) trip_id: String,
    pub(crate) points: Vec<LocationRecord>,
    pub(crate) dropped: usize,
}

impl FilteredChunk {
    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    pub fn points(&self) -> &[LocationRecord] {
        &self.points
    }

    /// Number of records rejected by the filter.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// True when fewer than two points remain, so no movement can be priced.
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 2
    }
}

/// Final fare for one trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FareResult {
    pub trip_id: String,
    pub fare: f64,
}
