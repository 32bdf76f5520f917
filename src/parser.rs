//! CSV decoding of location rows.
//!
//! The first row is a header and is skipped. Each following row must hold a
//! trip id, latitude, longitude and an integer epoch timestamp.

use std::io::Read;

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::{MalformedRecordError, PipelineError, RecordDefect};
use crate::pipeline::LocationRecord;

const FIELDS: usize = 4;

fn parse_coordinate(
    raw: &str,
    field: &'static str,
    limit: f64,
) -> Result<f64, RecordDefect> {
    let value: f64 = raw
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| RecordDefect::InvalidNumber {
            field,
            value: raw.to_string(),
        })?;

    if value.abs() > limit {
        return Err(RecordDefect::OutOfRange { field, value });
    }
    Ok(value)
}

fn parse_fields(record: &StringRecord) -> Result<LocationRecord, RecordDefect> {
    if record.len() != FIELDS {
        return Err(RecordDefect::FieldCount {
            found: record.len(),
        });
    }

    let latitude = parse_coordinate(&record[1], "latitude", 90.0)?;
    let longitude = parse_coordinate(&record[2], "longitude", 180.0)?;
    let timestamp = record[3]
        .parse()
        .map_err(|_| RecordDefect::InvalidNumber {
            field: "timestamp",
            value: record[3].to_string(),
        })?;

    Ok(LocationRecord::new(&record[0], latitude, longitude, timestamp))
}

/// Decodes one CSV row into a [`LocationRecord`].
///
/// # Errors
///
/// Returns a [`MalformedRecordError`] naming `line` if the row has the wrong
/// number of fields, a number that does not parse, or a coordinate out of range.
pub fn parse_record(record: &StringRecord, line: u64) -> Result<LocationRecord, MalformedRecordError> {
    parse_fields(record).map_err(|defect| MalformedRecordError { line, defect })
}

/// Streams [`LocationRecord`]s out of CSV input, one row at a time.
pub struct RecordReader<R> {
    inner: csv::Reader<R>,
    row: StringRecord,
}

impl<R: Read> RecordReader<R> {
    pub fn new(input: R) -> Self {
        let inner = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(input);

        Self {
            inner,
            row: StringRecord::new(),
        }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<LocationRecord, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.read_record(&mut self.row) {
            Ok(false) => None,
            Ok(true) => {
                let line = self.row.position().map_or(0, |p| p.line());
                Some(parse_record(&self.row, line).map_err(PipelineError::from))
            }
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line());
                let message = e.to_string();
                Some(Err(match e.into_kind() {
                    csv::ErrorKind::Io(io) => PipelineError::Io(io),
                    _ => MalformedRecordError {
                        line,
                        defect: RecordDefect::Syntax(message),
                    }
                    .into(),
                }))
            }
        }
    }
}
