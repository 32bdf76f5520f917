//! Great-circle distance on a spherical earth.

use clap::ValueEnum;
use serde::Serialize;

/// Mean earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Formula used to measure the distance between two fixes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DistanceFormula {
    /// Haversine formula, stable for small separations.
    #[default]
    Haversine,
    /// Spherical law of cosines. Cheaper, but loses precision when the two
    /// points are very close together.
    #[value(name = "cosines")]
    SphericalCosines,
}

impl DistanceFormula {
    /// Distance in kilometers between two points given in degrees.
    pub fn distance(self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        match self {
            DistanceFormula::Haversine => haversine(lat1, lon1, lat2, lon2),
            DistanceFormula::SphericalCosines => spherical_cosines(lat1, lon1, lat2, lon2),
        }
    }
}

/// Distance in kilometers between two points, using the haversine formula.
pub fn geo_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine(lat1, lon1, lat2, lon2)
}

fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (delta_lon / 2.0).sin().powi(2);

    // rounding can push `a` just past 1.0 for antipodal points
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_KM * c
}

fn spherical_cosines(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let delta_lon = (lon2 - lon1).to_radians();

    let cos_c = lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * delta_lon.cos();

    EARTH_RADIUS_KM * cos_c.clamp(-1.0, 1.0).acos()
}
