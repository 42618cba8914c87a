//! Voice-activity-triggered audio segmentation.
//!
//! Continuously samples a live audio stream, detects when loudness crosses a
//! threshold, and emits two clips per speech event: an early fixed-duration
//! preview (including a pre-trigger lead-in) and a complete clip that runs
//! from the same start point until sustained silence. The preview feeds fast
//! wake-word checks; the complete clip feeds full transcription.
//!
//! The environment supplies a [`audio::LoudnessSource`] and a
//! [`audio::ChunkSource`]; [`Session`] wires them to the segmentation engine
//! and drives everything from one scheduler. With the default `mic` feature,
//! [`audio::open_microphone`] provides both against real hardware.

pub mod audio;
pub mod config;
mod session;
pub mod telemetry;

pub use audio::{AudioClip, ClipWindow, SegmentPhase};
pub use config::SessionConfig;
pub use session::{Session, SessionCallbacks, SessionEngine};
