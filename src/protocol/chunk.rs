//! Chunk accumulator.
//!
//! Buffers encoded records until the next one would push the serialized
//! frame to the configured budget. Sizes always include the frame overhead
//! (length prefix, agency header, continuation flag), so `current_size()`
//! is the exact length the frame would have on the wire.

use crate::protocol::{frame_overhead, SEPARATOR};
use bytes::{BufMut, BytesMut};

/// Passive buffer of records waiting to be framed.
#[derive(Debug)]
pub struct ChunkAccumulator {
    /// `;`-joined records.
    buf: BytesMut,
    /// Records currently buffered.
    records: usize,
    /// Fixed bytes spent on the frame envelope.
    overhead: usize,
    /// Frame size a chunk must stay below.
    budget: usize,
}

impl ChunkAccumulator {
    /// Create an empty accumulator for an agency id of `agency_len` bytes.
    pub fn new(agency_len: usize, budget: usize) -> Self {
        let overhead = frame_overhead(agency_len);
        Self {
            buf: BytesMut::with_capacity(budget.saturating_sub(overhead)),
            records: 0,
            overhead,
            budget,
        }
    }

    /// Serialized frame size of the current chunk.
    pub fn current_size(&self) -> usize {
        self.overhead + self.buf.len()
    }

    /// Size of an empty chunk.
    pub fn overhead(&self) -> usize {
        self.overhead
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Whether appending a record of `encoded_len` bytes would reach the budget.
    pub fn would_overflow(&self, encoded_len: usize) -> bool {
        self.size_with(encoded_len) >= self.budget
    }

    /// Append a record, returning whether the chunk is now full.
    ///
    /// The caller checks `would_overflow` first; this never refuses a record.
    pub fn push(&mut self, encoded: &[u8]) -> bool {
        if self.records > 0 {
            self.buf.put_u8(SEPARATOR);
        }
        self.buf.extend_from_slice(encoded);
        self.records += 1;
        self.is_full()
    }

    /// True when not even a one-byte record fits anymore.
    pub fn is_full(&self) -> bool {
        self.would_overflow(1)
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Number of records in the chunk.
    pub fn records(&self) -> usize {
        self.records
    }

    /// The `;`-joined records.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Drop the buffered records, keeping the allocation.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.records = 0;
    }

    fn size_with(&self, encoded_len: usize) -> usize {
        let separator = usize::from(self.records > 0);
        self.current_size() + separator + encoded_len
    }
}
