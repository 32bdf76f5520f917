//! Time-and-distance tariff.
//!
//! A trip starts at the flag-fall. Every pair of consecutive retained points
//! is either moving (charged per km, day or night rate) or idle (charged per
//! hour). The total is floored at [`MIN_FARE`].

use serde::Serialize;

use crate::geo::DistanceFormula;
use crate::pipeline::filter::{distance_km, elapsed_hours, speed_kmh};
use crate::pipeline::types::{FilteredChunk, LocationRecord};

pub const FLAG_FALL: f64 = 1.30;
pub const MIN_FARE: f64 = 3.47;
pub const DAY_RATE_PER_KM: f64 = 0.74;
pub const NIGHT_RATE_PER_KM: f64 = 1.30;
pub const IDLE_RATE_PER_HOUR: f64 = 11.90;

/// At or below this speed (km/h) a segment is charged as idle time.
pub const IDLE_SPEED_KMH: f64 = 10.0;

/// Day tariff applies from this UTC hour (inclusive) until midnight.
pub const DAY_START_HOUR: i64 = 5;

/// UTC hour of day for an epoch timestamp, ignoring calendars and time zones.
pub fn hour_of_day(timestamp: i64) -> i64 {
    timestamp.div_euclid(3600).rem_euclid(24)
}

fn is_day(timestamp: i64) -> bool {
    (DAY_START_HOUR..24).contains(&hour_of_day(timestamp))
}

/// Where a trip's fare came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FareBreakdown {
    pub flag_fall: f64,
    pub day_km: f64,
    pub night_km: f64,
    pub idle_hours: f64,
    pub moving_segments: usize,
    pub idle_segments: usize,
    /// Charges before the minimum fare is applied.
    pub subtotal: f64,
    pub total: f64,
}

impl FareBreakdown {
    fn add_segment(&mut self, from: &LocationRecord, distance: f64, hours: f64) {
        match speed_kmh(distance, hours) {
            Some(speed) if speed > IDLE_SPEED_KMH => {
                self.moving_segments += 1;
                if is_day(from.timestamp) {
                    self.day_km += distance;
                    self.subtotal += distance * DAY_RATE_PER_KM;
                } else {
                    self.night_km += distance;
                    self.subtotal += distance * NIGHT_RATE_PER_KM;
                }
            }
            // no elapsed time is idle for zero hours
            _ => {
                self.idle_segments += 1;
                self.idle_hours += hours;
                self.subtotal += hours * IDLE_RATE_PER_HOUR;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FareEngine {
    pub formula: DistanceFormula,
}

impl FareEngine {
    pub fn new(formula: DistanceFormula) -> Self {
        Self { formula }
    }

    /// Itemized fare. All zero for a degenerate trip.
    pub fn breakdown(&self, chunk: &FilteredChunk) -> FareBreakdown {
        let points = chunk.points();
        if points.len() < 2 {
            return FareBreakdown::default();
        }

        let mut breakdown = FareBreakdown {
            flag_fall: FLAG_FALL,
            subtotal: FLAG_FALL,
            ..Default::default()
        };

        for pair in points.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            breakdown.add_segment(
                from,
                distance_km(self.formula, from, to),
                elapsed_hours(from, to),
            );
        }

        breakdown.total = breakdown.subtotal.max(MIN_FARE);
        breakdown
    }

    pub fn fare(&self, chunk: &FilteredChunk) -> f64 {
        self.breakdown(chunk).total
    }
}
