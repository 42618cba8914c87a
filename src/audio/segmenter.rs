//! The voice-activity segmentation state machine.
//!
//! Consumes loudness samples stamped with the session clock and decides when
//! to emit the two clips of a speech event: the fixed-duration preview and
//! the complete clip that closes on sustained silence. At most one event is
//! in flight at a time; a new threshold crossing is only recognized from
//! `Idle`.

use super::assembler::ClipWindow;
use crate::config::SessionConfig;

/// Externally observable phase of the machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SegmentPhase {
    Idle,
    /// Threshold crossed; collecting toward the fixed preview duration.
    PreviewPending,
    /// Preview emitted; watching for sustained silence.
    AwaitingSilence,
}

/// Why a complete clip was closed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Silence,
    MaxEvent,
}

impl CloseReason {
    pub fn label(self) -> &'static str {
        match self {
            CloseReason::Silence => "silence",
            CloseReason::MaxEvent => "max_event",
        }
    }
}

/// Emission requested by the machine for the current sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentAction {
    EmitPreview { window: ClipWindow },
    EmitComplete { window: ClipWindow, reason: CloseReason },
}

enum State {
    Idle,
    PreviewPending {
        crossed_at_ms: u64,
        event_start_ms: u64,
    },
    AwaitingSilence {
        event_start_ms: u64,
        silence_since_ms: Option<u64>,
    },
}

pub struct Segmenter {
    threshold: f32,
    preview_ms: u64,
    lead_in_ms: u64,
    silence_ms: u64,
    max_event_ms: Option<u64>,
    state: State,
}

impl Segmenter {
    pub fn new(cfg: &SessionConfig) -> Self {
        Self {
            threshold: cfg.loudness_threshold,
            preview_ms: cfg.preview_ms,
            lead_in_ms: cfg.lead_in_ms,
            silence_ms: cfg.silence_ms,
            max_event_ms: cfg.max_event_ms,
            state: State::Idle,
        }
    }

    pub fn phase(&self) -> SegmentPhase {
        match self.state {
            State::Idle => SegmentPhase::Idle,
            State::PreviewPending { .. } => SegmentPhase::PreviewPending,
            State::AwaitingSilence { .. } => SegmentPhase::AwaitingSilence,
        }
    }

    /// Start of the currently active speech event, fixed for its duration.
    pub fn event_start_ms(&self) -> Option<u64> {
        match self.state {
            State::Idle => None,
            State::PreviewPending { event_start_ms, .. }
            | State::AwaitingSilence { event_start_ms, .. } => Some(event_start_ms),
        }
    }

    /// Process one loudness sample and return any emission it triggers.
    pub fn on_sample(&mut self, now_ms: u64, loudness: f32) -> Option<SegmentAction> {
        match self.state {
            State::Idle => {
                if loudness >= self.threshold {
                    self.state = State::PreviewPending {
                        crossed_at_ms: now_ms,
                        event_start_ms: now_ms.saturating_sub(self.lead_in_ms),
                    };
                }
                None
            }
            State::PreviewPending {
                crossed_at_ms,
                event_start_ms,
            } => {
                // The preview window is time-bounded, not loudness-bounded:
                // loudness may drop right back below threshold and the clip
                // still fills out to its fixed duration.
                if now_ms.saturating_sub(crossed_at_ms) < self.preview_ms {
                    return None;
                }
                self.state = State::AwaitingSilence {
                    event_start_ms,
                    silence_since_ms: None,
                };
                Some(SegmentAction::EmitPreview {
                    window: ClipWindow::bounded(event_start_ms, event_start_ms + self.preview_ms),
                })
            }
            State::AwaitingSilence {
                event_start_ms,
                ref mut silence_since_ms,
            } => {
                if let Some(cap) = self.max_event_ms {
                    if now_ms.saturating_sub(event_start_ms) >= cap {
                        self.state = State::Idle;
                        return Some(SegmentAction::EmitComplete {
                            window: ClipWindow::open_ended(event_start_ms),
                            reason: CloseReason::MaxEvent,
                        });
                    }
                }
                if loudness >= self.threshold {
                    *silence_since_ms = None;
                    return None;
                }
                let since = *silence_since_ms.get_or_insert(now_ms);
                if now_ms.saturating_sub(since) < self.silence_ms {
                    return None;
                }
                self.state = State::Idle;
                Some(SegmentAction::EmitComplete {
                    window: ClipWindow::open_ended(event_start_ms),
                    reason: CloseReason::Silence,
                })
            }
        }
    }

    /// Abandon any in-flight event and return to `Idle`.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }
}
