//! Session configuration and validation.
//!
//! One flat set of named, independently overridable options. A config is
//! validated once at `start()` and is immutable for the life of a session.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOUDNESS_THRESHOLD: f32 = 20.0;
pub const DEFAULT_SILENCE_MS: u64 = 1_000;
pub const DEFAULT_PREVIEW_MS: u64 = 1_500;
pub const DEFAULT_LEAD_IN_MS: u64 = 300;
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 50;
pub const DEFAULT_CHUNK_SLICE_MS: u64 = 100;
pub const DEFAULT_CONTAINER_MIME: &str = "audio/wav";
pub const DEFAULT_HEADER_CHUNK_COUNT: usize = 1;

/// Upper bound accepted for `max_event_ms` (10 minutes).
pub const MAX_EVENT_HARD_LIMIT_MS: u64 = 600_000;

/// Tunable parameters for one segmentation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Normalized loudness (0-100) at or above which audio counts as speech.
    pub loudness_threshold: f32,
    /// Continuous below-threshold time required to close an active event.
    pub silence_ms: u64,
    /// Fixed duration of the early preview clip.
    pub preview_ms: u64,
    /// Audio retained before the instant of threshold crossing, so the
    /// onset of speech is not clipped.
    pub lead_in_ms: u64,
    /// Interval between loudness samples.
    pub sample_interval_ms: u64,
    /// Interval between chunk polls on the recorder.
    pub chunk_slice_ms: u64,
    /// Container MIME tag applied to every assembled clip.
    pub container_mime: String,
    /// Leading chunks retained as the reusable container header set.
    pub header_chunk_count: usize,
    /// Optional hard cap on one speech event. `None` lets the complete clip
    /// grow until silence is confirmed, however long the speaker talks.
    pub max_event_ms: Option<u64>,
    /// Ask the input backend to cancel echo. Advisory.
    pub echo_cancellation: bool,
    /// Ask the input backend to suppress noise. Advisory.
    pub noise_suppression: bool,
    /// Ask the input backend for automatic gain control. Advisory.
    pub auto_gain: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            loudness_threshold: DEFAULT_LOUDNESS_THRESHOLD,
            silence_ms: DEFAULT_SILENCE_MS,
            preview_ms: DEFAULT_PREVIEW_MS,
            lead_in_ms: DEFAULT_LEAD_IN_MS,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            chunk_slice_ms: DEFAULT_CHUNK_SLICE_MS,
            container_mime: DEFAULT_CONTAINER_MIME.to_string(),
            header_chunk_count: DEFAULT_HEADER_CHUNK_COUNT,
            max_event_ms: None,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain: true,
        }
    }
}

impl SessionConfig {
    /// Check option values and normalize the container tag.
    pub fn validate(&mut self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.loudness_threshold) {
            bail!(
                "loudness_threshold must be between 0 and 100, got {}",
                self.loudness_threshold
            );
        }
        if self.silence_ms == 0 {
            bail!("silence_ms must be greater than zero");
        }
        if self.preview_ms == 0 {
            bail!("preview_ms must be greater than zero");
        }
        if self.sample_interval_ms == 0 || self.sample_interval_ms > 1_000 {
            bail!(
                "sample_interval_ms must be between 1 and 1000, got {}",
                self.sample_interval_ms
            );
        }
        if self.chunk_slice_ms == 0 || self.chunk_slice_ms > 5_000 {
            bail!(
                "chunk_slice_ms must be between 1 and 5000, got {}",
                self.chunk_slice_ms
            );
        }

        self.container_mime = self.container_mime.trim().to_ascii_lowercase();
        let (kind, subtype) = self
            .container_mime
            .split_once('/')
            .unwrap_or((self.container_mime.as_str(), ""));
        if kind != "audio" || subtype.is_empty() {
            bail!(
                "container_mime must be an audio/* MIME type, got '{}'",
                self.container_mime
            );
        }

        if let Some(cap) = self.max_event_ms {
            if cap < self.silence_ms + self.preview_ms {
                bail!(
                    "max_event_ms ({cap}) must cover at least preview_ms + silence_ms ({})",
                    self.silence_ms + self.preview_ms
                );
            }
            if cap > MAX_EVENT_HARD_LIMIT_MS {
                bail!("max_event_ms must not exceed {MAX_EVENT_HARD_LIMIT_MS}, got {cap}");
            }
        }
        Ok(())
    }

    /// Load a config from YAML, applying defaults for absent fields.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut cfg: Self =
            serde_yaml::from_str(yaml).context("failed to parse session config YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }
}
