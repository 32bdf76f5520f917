//! Rejects GPS fixes that imply an implausible speed.

use crate::geo::DistanceFormula;
use crate::pipeline::types::{Chunk, FilteredChunk, LocationRecord};

/// Fastest believable speed between two retained fixes, in km/h.
pub const MAX_PLAUSIBLE_SPEED_KMH: f64 = 100.0;

/// Hours elapsed between two fixes, regardless of their order.
pub(crate) fn elapsed_hours(from: &LocationRecord, to: &LocationRecord) -> f64 {
    to.timestamp.abs_diff(from.timestamp) as f64 / 3600.0
}

pub(crate) fn distance_km(formula: DistanceFormula, from: &LocationRecord, to: &LocationRecord) -> f64 {
    formula.distance(from.latitude, from.longitude, to.latitude, to.longitude)
}

/// Speed between two fixes in km/h, or `None` when they share a timestamp.
pub(crate) fn speed_kmh(distance_km: f64, elapsed_hours: f64) -> Option<f64> {
    (elapsed_hours > 0.0).then(|| distance_km / elapsed_hours)
}

#[derive(Debug, Clone, Copy)]
pub struct PointFilter {
    pub max_speed_kmh: f64,
    pub formula: DistanceFormula,
}

impl Default for PointFilter {
    fn default() -> Self {
        Self {
            max_speed_kmh: MAX_PLAUSIBLE_SPEED_KMH,
            formula: DistanceFormula::default(),
        }
    }
}

impl PointFilter {
    pub fn new(formula: DistanceFormula) -> Self {
        Self {
            formula,
            ..Default::default()
        }
    }

    /// Keeps the first record, then every record reachable from the last kept
    /// one at or below the speed limit.
    ///
    /// Two fixes with the same timestamp have no defined speed: the later one
    /// is kept only if it sits at the same position.
    pub fn filter(&self, chunk: Chunk) -> FilteredChunk {
        let trip_id = chunk.trip_id().to_string();
        let mut records = chunk.into_records().into_iter();

        let mut points = Vec::with_capacity(records.len());
        let mut dropped = 0;

        if let Some(first) = records.next() {
            points.push(first);
        }

        for record in records {
            let last = &points[points.len() - 1];
            let distance = distance_km(self.formula, last, &record);

            let plausible = match speed_kmh(distance, elapsed_hours(last, &record)) {
                Some(speed) => speed <= self.max_speed_kmh,
                None => distance == 0.0,
            };

            if plausible {
                points.push(record);
            } else {
                dropped += 1;
            }
        }

        FilteredChunk {
            trip_id,
            points,
            dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::chunker::process_stream;

    const T0: i64 = 1_609_459_200;

    fn chunk(records: Vec<LocationRecord>) -> Chunk {
        let mut chunks: Vec<_> = process_stream(records).collect();
        assert_eq!(chunks.len(), 1);
        chunks.remove(0)
    }

    fn rec(latitude: f64, longitude: f64, timestamp: i64) -> LocationRecord {
        LocationRecord::new("1", latitude, longitude, timestamp)
    }

    #[test]
    fn test_single_record_is_retained() {
        let filtered = PointFilter::default().filter(chunk(vec![rec(35.0, 51.0, T0)]));
        assert_eq!(filtered.points().len(), 1);
        assert!(filtered.is_degenerate());
    }

    #[test]
    fn test_rejects_fast_transition() {
        // ~6.7 km/h then ~660 km/h
        let input = vec![
            rec(35.0, 51.0, T0),
            rec(35.001, 51.0, T0 + 60),
            rec(35.1, 51.0, T0 + 120),
        ];
        let filtered = PointFilter::default().filter(chunk(input.clone()));

        assert_eq!(filtered.points(), &input[..2]);
        assert_eq!(filtered.dropped(), 1);
    }

    #[test]
    fn test_speed_is_measured_from_last_retained_point() {
        // the outlier is ~55 km away; the third point is close to the first
        let input = vec![
            rec(35.0, 51.0, T0),
            rec(35.5, 51.0, T0 + 60),
            rec(35.002, 51.0, T0 + 120),
        ];
        let filtered = PointFilter::default().filter(chunk(input.clone()));

        assert_eq!(filtered.points(), &[input[0].clone(), input[2].clone()]);
    }

    #[test]
    fn test_first_record_always_kept() {
        let input = vec![
            rec(35.0, 51.0, T0),
            rec(40.0, 60.0, T0 + 1),
            rec(45.0, 70.0, T0 + 2),
        ];
        let filtered = PointFilter::default().filter(chunk(input.clone()));

        assert_eq!(filtered.points()[0], input[0]);
        assert_eq!(filtered.points().len(), 1);
        assert_eq!(filtered.dropped(), 2);
    }

    #[test]
    fn test_same_timestamp_same_position_is_kept() {
        let input = vec![rec(35.0, 51.0, T0), rec(35.0, 51.0, T0)];
        let filtered = PointFilter::default().filter(chunk(input));
        assert_eq!(filtered.points().len(), 2);
    }

    #[test]
    fn test_same_timestamp_different_position_is_dropped() {
        let input = vec![rec(35.0, 51.0, T0), rec(35.0001, 51.0, T0)];
        let filtered = PointFilter::default().filter(chunk(input));
        assert_eq!(filtered.points().len(), 1);
        assert_eq!(filtered.dropped(), 1);
    }

    #[test]
    fn test_out_of_order_timestamps_use_absolute_gap() {
        let input = vec![rec(35.0, 51.0, T0 + 60), rec(35.001, 51.0, T0)];
        let filtered = PointFilter::default().filter(chunk(input));
        assert_eq!(filtered.points().len(), 2);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let from = rec(35.0, 51.0, i64::MIN);
        let to = rec(35.001, 51.0, i64::MAX);

        let hours = elapsed_hours(&from, &to);
        assert!(hours.is_finite() && hours > 0.0);
        assert_eq!(hours, elapsed_hours(&to, &from));

        let filtered = PointFilter::default().filter(chunk(vec![from, to]));
        assert_eq!(filtered.points().len(), 2);
    }

    #[test]
    fn test_speed_kmh_undefined_without_elapsed_time() {
        assert_eq!(speed_kmh(1.0, 0.0), None);
        assert_eq!(speed_kmh(10.0, 0.5), Some(20.0));
    }
}
