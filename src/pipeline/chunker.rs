//! Splits an ordered record stream into per-trip chunks.
//!
//! Input is expected to be clustered by trip id. Records of one trip that
//! appear in two separate runs come out as two chunks; nothing is regrouped.

use crate::pipeline::types::{Chunk, LocationRecord};

/// Accumulates records into the currently open chunk.
#[derive(Debug, Default)]
pub struct TripChunker {
    open: Option<Chunk>,
}

impl TripChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record, returning the previous chunk if this record closed it.
    pub fn push(&mut self, record: LocationRecord) -> Option<Chunk> {
        match self.open.as_mut() {
            None => {
                self.open = Some(Chunk::new(record));
                None
            }
            Some(chunk) => match chunk.push(record) {
                Ok(()) => None,
                Err(record) => self.open.replace(Chunk::new(record)),
            },
        }
    }

    /// Closes the stream, returning the last open chunk if any.
    pub fn finish(self) -> Option<Chunk> {
        self.open
    }
}

/// Lazy iterator of chunks over a record iterator. See [`process_stream`].
pub struct Chunks<I> {
    records: I,
    chunker: Option<TripChunker>,
}

impl<I> Iterator for Chunks<I>
where
    I: Iterator<Item = LocationRecord>,
{
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let chunker = self.chunker.as_mut()?;

        for record in self.records.by_ref() {
            if let Some(closed) = chunker.push(record) {
                return Some(closed);
            }
        }

        self.chunker.take().and_then(TripChunker::finish)
    }
}

/// Groups consecutive records with the same trip id into chunks, lazily.
pub fn process_stream<I>(records: I) -> Chunks<I::IntoIter>
where
    I: IntoIterator<Item = LocationRecord>,
{
    Chunks {
        records: records.into_iter(),
        chunker: Some(TripChunker::new()),
    }
}
