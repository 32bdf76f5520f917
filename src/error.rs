//! Error types shared across the fare pipeline.

use std::fmt;

/// What is wrong with a rejected input row.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordDefect {
    /// The row does not have exactly four fields.
    FieldCount { found: usize },
    /// A numeric field could not be parsed, or parsed to NaN or infinity.
    InvalidNumber { field: &'static str, value: String },
    /// A coordinate parsed but lies outside its valid range.
    OutOfRange { field: &'static str, value: f64 },
    /// The CSV reader itself rejected the row.
    Syntax(String),
}

impl fmt::Display for RecordDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordDefect::FieldCount { found } => write!(f, "expected 4 fields, found {found}"),
            RecordDefect::InvalidNumber { field, value } => {
                write!(f, "invalid {field} value {value:?}")
            }
            RecordDefect::OutOfRange { field, value } => {
                write!(f, "{field} {value} is out of range")
            }
            RecordDefect::Syntax(message) => write!(f, "{message}"),
        }
    }
}

/// An input row that could not be turned into a location record.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("malformed record on line {line}: {defect}")]
pub struct MalformedRecordError {
    /// 1-based line number in the input, header included.
    pub line: u64,
    pub defect: RecordDefect,
}

/// A trip identifier that cannot be ordered numerically.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("trip identifier {trip_id:?} is not an integer")]
pub struct InvalidTripIdentifierError {
    pub trip_id: String,
}

/// Fatal conditions that stop a pipeline run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    MalformedRecord(#[from] MalformedRecordError),
    #[error(transparent)]
    InvalidTripIdentifier(#[from] InvalidTripIdentifierError),
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("chunk producer stopped unexpectedly: {0}")]
    Producer(String),
    /// Pricing stopped because the chunk producer failed.
    #[error("pricing halted after the input reader failed")]
    Halted,
}
