//! Chunked continuous capture, loudness sampling, and the voice-activity
//! segmentation engine.
//!
//! The environment plugs in through two seams: a [`LoudnessSource`] that
//! yields frequency-bin magnitudes, and a [`ChunkSource`] that yields
//! container chunks from one long-lived recording session. Everything else
//! is pure and driven by the session scheduler.

mod assembler;
mod chunk;
mod loudness;
#[cfg(feature = "mic")]
mod mic;
mod recorder;
mod segmenter;

pub use assembler::{assemble_clip, AudioClip, ClipWindow};
pub use chunk::{ChunkBuffer, ChunkRecord, HeaderChunks};
pub use loudness::{loudness_percent, LoudnessSampler, LoudnessSource};
#[cfg(feature = "mic")]
pub use mic::{list_input_devices, open_microphone, MicChunkSource, MicLoudnessSource};
pub use recorder::{ChunkSource, ContinuousRecorder};
pub use segmenter::{CloseReason, SegmentAction, SegmentPhase, Segmenter};
