//! Continuous chunk recording over an environment-supplied source.
//!
//! One underlying recording session per `start()`. The session is never torn
//! down just to get a fresh clip: doing so would discard the container
//! header packets and leave later sub-slices undecodable. After a speech
//! event completes, only the payload buffer restarts; headers survive.

use super::chunk::{ChunkBuffer, ChunkRecord, HeaderChunks};
use crate::config::SessionConfig;
use anyhow::Result;
use tracing::{debug, warn};

/// The environment's recorder: a single long-lived recording session that
/// yields container chunks when polled.
///
/// `start` is where device acquisition and container mismatch fail, before
/// any session state exists. `poll_chunk` must never block; it returns
/// `None` when no chunk is ready yet.
pub trait ChunkSource {
    fn start(&mut self, cfg: &SessionConfig) -> Result<()>;
    fn poll_chunk(&mut self) -> Option<Vec<u8>>;
    fn stop(&mut self);
}

/// Wraps a [`ChunkSource`], stamping each chunk at arrival and retaining the
/// first `header_chunk_count` chunks as the frozen header set.
pub struct ContinuousRecorder {
    source: Box<dyn ChunkSource + Send>,
    chunks: ChunkBuffer,
    headers: HeaderChunks,
    recording: bool,
}

impl ContinuousRecorder {
    pub fn new(source: Box<dyn ChunkSource + Send>) -> Self {
        Self {
            source,
            chunks: ChunkBuffer::new(),
            headers: HeaderChunks::new(0),
            recording: false,
        }
    }

    /// Start exactly one recording session.
    pub fn start(&mut self, cfg: &SessionConfig) -> Result<()> {
        if self.recording {
            warn!("recorder already running; ignoring start");
            return Ok(());
        }
        self.source.start(cfg)?;
        self.chunks.clear();
        self.headers.reset(cfg.header_chunk_count);
        self.recording = true;
        Ok(())
    }

    /// Drain every chunk the source has ready, stamping each with `now_ms`.
    /// Returns how many chunks were appended.
    pub fn poll(&mut self, now_ms: u64) -> usize {
        if !self.recording {
            return 0;
        }
        let mut appended = 0;
        while let Some(payload) = self.source.poll_chunk() {
            self.chunks.push(payload, now_ms);
            if let Some(record) = self.chunks.back() {
                self.headers.observe(record);
            }
            appended += 1;
        }
        appended
    }

    /// Restart the payload buffer after a completed speech event. Headers
    /// are content-independent container boilerplate and stay valid for the
    /// same container configuration, so they are preserved.
    pub fn restart_buffer(&mut self) {
        debug!(
            dropped_chunks = self.chunks.len(),
            kept_headers = self.headers.len(),
            "restarting chunk buffer"
        );
        self.chunks.clear();
    }

    /// Stop the source and clear all buffers. Idempotent.
    pub fn stop(&mut self) {
        if self.recording {
            self.source.stop();
        }
        self.chunks.clear();
        self.headers.reset(0);
        self.recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn chunks(&self) -> &ChunkBuffer {
        &self.chunks
    }

    pub fn headers(&self) -> &HeaderChunks {
        &self.headers
    }

    pub fn last_chunk(&self) -> Option<&ChunkRecord> {
        self.chunks.back()
    }

    /// Hand the underlying source back, for reuse by a later session.
    pub fn into_source(self) -> Box<dyn ChunkSource + Send> {
        self.source
    }
}
