//! Clip assembly: header chunks plus every payload chunk overlapping a
//! requested time window, concatenated into one deliverable object.

use super::chunk::{ChunkBuffer, HeaderChunks};

/// Time window one clip must cover. `end_ms: None` means "until now", the
/// unbounded upper end of a complete clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipWindow {
    pub start_ms: u64,
    pub end_ms: Option<u64>,
}

impl ClipWindow {
    pub fn bounded(start_ms: u64, end_ms: u64) -> Self {
        Self {
            start_ms,
            end_ms: Some(end_ms),
        }
    }

    pub fn open_ended(start_ms: u64) -> Self {
        Self {
            start_ms,
            end_ms: None,
        }
    }

    /// Inclusion test for a chunk's end timestamp.
    pub fn contains(&self, at_ms: u64) -> bool {
        at_ms >= self.start_ms && self.end_ms.map_or(true, |end| at_ms <= end)
    }
}

/// One deliverable clip: container-tagged bytes that decode standalone
/// because the session's header chunks are always prepended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub mime: String,
    pub data: Vec<u8>,
    pub window: ClipWindow,
}

/// Build `headers ++ chunks-in-window`, preserving insertion order.
///
/// Returns `None` when no chunk overlaps the window: nothing has been
/// captured for it yet, and a truncated clip would misreport its duration.
/// Callers treat that as a silent skip, not an error.
pub fn assemble_clip(
    headers: &HeaderChunks,
    chunks: &ChunkBuffer,
    window: ClipWindow,
    mime: &str,
) -> Option<AudioClip> {
    let selected: Vec<_> = chunks
        .iter()
        .filter(|record| window.contains(record.end_at_ms))
        .collect();
    if selected.is_empty() {
        return None;
    }

    let payload_bytes: usize = selected.iter().map(|r| r.payload.len()).sum();
    let mut data = Vec::with_capacity(headers.total_bytes() + payload_bytes);
    for record in headers.records() {
        data.extend_from_slice(&record.payload);
    }
    for record in selected {
        data.extend_from_slice(&record.payload);
    }

    Some(AudioClip {
        mime: mime.to_string(),
        data,
        window,
    })
}
