//! Time-stamped chunk storage for one continuous recording session.
//!
//! Chunks carry their timestamp in an explicit paired record rather than as
//! metadata bolted onto the payload, and ordering is insertion order only.

use std::collections::VecDeque;

/// One opaque container chunk plus the session-clock instant (milliseconds)
/// at which its data collection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub payload: Vec<u8>,
    pub end_at_ms: u64,
}

/// Append-ordered buffer of chunks from a single recording session.
///
/// Stamps are strictly increasing: a coarse clock can hand two chunks the
/// same millisecond, so `push` nudges a non-advancing stamp past the
/// previous one. The buffer is append-only while a clip is being assembled;
/// nothing here mutates records after insertion.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: VecDeque<ChunkRecord>,
    total_bytes: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the stamp actually assigned.
    pub fn push(&mut self, payload: Vec<u8>, end_at_ms: u64) -> u64 {
        let stamp = match self.chunks.back() {
            Some(last) if end_at_ms <= last.end_at_ms => last.end_at_ms + 1,
            _ => end_at_ms,
        };
        self.total_bytes = self.total_bytes.saturating_add(payload.len());
        self.chunks.push_back(ChunkRecord {
            payload,
            end_at_ms: stamp,
        });
        stamp
    }

    pub fn back(&self) -> Option<&ChunkRecord> {
        self.chunks.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkRecord> {
        self.chunks.iter()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_bytes = 0;
    }
}

/// The first chunks of a recording session, retained separately because
/// containers place essential decode metadata only in their leading packets.
/// Once `target` chunks have been observed the set is frozen; it stays valid
/// across buffer restarts of the same container configuration.
#[derive(Debug, Default, Clone)]
pub struct HeaderChunks {
    records: Vec<ChunkRecord>,
    target: usize,
}

impl HeaderChunks {
    pub fn new(target: usize) -> Self {
        Self {
            records: Vec::with_capacity(target),
            target,
        }
    }

    /// Copy `record` into the header set unless capture is already frozen.
    pub fn observe(&mut self, record: &ChunkRecord) {
        if !self.is_frozen() {
            self.records.push(record.clone());
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.records.len() >= self.target
    }

    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.records.iter().map(|r| r.payload.len()).sum()
    }

    /// Drop all captured headers and re-arm capture for `target` chunks.
    pub fn reset(&mut self, target: usize) {
        self.records.clear();
        self.target = target;
    }
}
