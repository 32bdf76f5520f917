pub mod config;
pub mod error;
pub mod geo;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod stats;

pub use geo::geo_distance;
pub use pipeline::{compute_fare, estimate_fares, process_stream};
