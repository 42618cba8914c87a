//! Session lifecycle: one controller wiring the loudness sampler, the
//! segmentation state machine, and clip assembly behind a single scheduler.
//!
//! [`SessionEngine`] is the deterministic core, driven by explicit clock
//! values so it can be embedded in any event loop (and scripted in tests).
//! [`Session`] owns the live arrangement: it acquires the sources, spawns
//! one scheduler thread that centralizes the volume and chunk ticks, and
//! guarantees that no callback fires after `stop()` returns.

use crate::audio::{
    assemble_clip, AudioClip, ChunkSource, ContinuousRecorder, LoudnessSampler, LoudnessSource,
    SegmentAction, SegmentPhase, Segmenter,
};
use crate::config::SessionConfig;
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Caller-provided sinks for the session's three outputs.
pub struct SessionCallbacks {
    /// Fires once per loudness sample, unconditionally, regardless of the
    /// state machine's phase.
    pub on_periodic_volume: Box<dyn FnMut(f32) + Send>,
    /// Fires with the fixed-duration early clip of each speech event.
    pub on_preview_clip: Box<dyn FnMut(AudioClip) + Send>,
    /// Fires with the full clip once sustained silence closes the event.
    pub on_complete_clip: Box<dyn FnMut(AudioClip) + Send>,
}

impl SessionCallbacks {
    /// Callbacks that ignore everything; a starting point for hosts that
    /// only care about a subset of outputs.
    pub fn noop() -> Self {
        Self {
            on_periodic_volume: Box::new(|_| {}),
            on_preview_clip: Box::new(|_| {}),
            on_complete_clip: Box::new(|_| {}),
        }
    }
}

/// The deterministic core of a session: continuous recorder, state machine,
/// and assembly, with the clock supplied by the caller.
pub struct SessionEngine {
    cfg: SessionConfig,
    segmenter: Segmenter,
    recorder: ContinuousRecorder,
}

impl SessionEngine {
    pub fn new(cfg: SessionConfig, source: Box<dyn ChunkSource + Send>) -> Self {
        let segmenter = Segmenter::new(&cfg);
        Self {
            cfg,
            segmenter,
            recorder: ContinuousRecorder::new(source),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.recorder.start(&self.cfg)
    }

    /// Chunk-slice tick: pull whatever the source has ready, stamped `now_ms`.
    pub fn handle_chunk_tick(&mut self, now_ms: u64) -> usize {
        self.recorder.poll(now_ms)
    }

    /// Loudness tick: report the sample and advance the state machine,
    /// emitting clips through `callbacks` when a window completes.
    pub fn handle_sample(&mut self, now_ms: u64, loudness: f32, callbacks: &mut SessionCallbacks) {
        (callbacks.on_periodic_volume)(loudness);
        match self.segmenter.on_sample(now_ms, loudness) {
            None => {}
            Some(SegmentAction::EmitPreview { window }) => {
                match assemble_clip(
                    self.recorder.headers(),
                    self.recorder.chunks(),
                    window,
                    &self.cfg.container_mime,
                ) {
                    Some(clip) => {
                        debug!(
                            start_ms = window.start_ms,
                            bytes = clip.data.len(),
                            "emitting preview clip"
                        );
                        (callbacks.on_preview_clip)(clip);
                    }
                    None => debug!(
                        start_ms = window.start_ms,
                        "preview window has no chunks yet; skipping emission"
                    ),
                }
            }
            Some(SegmentAction::EmitComplete { window, reason }) => {
                match assemble_clip(
                    self.recorder.headers(),
                    self.recorder.chunks(),
                    window,
                    &self.cfg.container_mime,
                ) {
                    Some(clip) => {
                        debug!(
                            start_ms = window.start_ms,
                            bytes = clip.data.len(),
                            reason = reason.label(),
                            "emitting complete clip"
                        );
                        (callbacks.on_complete_clip)(clip);
                    }
                    None => debug!(
                        start_ms = window.start_ms,
                        "complete window has no chunks; skipping emission"
                    ),
                }
                self.recorder.restart_buffer();
            }
        }
    }

    pub fn phase(&self) -> SegmentPhase {
        self.segmenter.phase()
    }

    pub fn chunk_count(&self) -> usize {
        self.recorder.chunks().len()
    }

    pub fn header_count(&self) -> usize {
        self.recorder.headers().len()
    }

    /// Stop recording and reset the state machine. Idempotent.
    pub fn stop(&mut self) {
        self.recorder.stop();
        self.segmenter.reset();
    }

    /// Tear down and hand the chunk source back for a later session.
    pub fn into_source(mut self) -> Box<dyn ChunkSource + Send> {
        self.stop();
        self.recorder.into_source()
    }
}

/// A live segmentation session over real time.
///
/// Only one session may be active per instance; the instance is reusable
/// after `stop()`.
pub struct Session {
    cfg: SessionConfig,
    loudness: Option<Box<dyn LoudnessSource + Send>>,
    chunks: Option<Box<dyn ChunkSource + Send>>,
    stop_flag: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<(SessionEngine, Box<dyn LoudnessSource + Send>)>>,
}

impl Session {
    pub fn new(
        cfg: SessionConfig,
        loudness: Box<dyn LoudnessSource + Send>,
        chunks: Box<dyn ChunkSource + Send>,
    ) -> Self {
        Self {
            cfg,
            loudness: Some(loudness),
            chunks: Some(chunks),
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    /// Validate the config, start continuous recording, and begin the
    /// scheduler. Acquisition and container failures propagate with no
    /// partial state left behind; calling while active warns and no-ops.
    pub fn start(&mut self, callbacks: SessionCallbacks) -> Result<()> {
        if self.worker.is_some() {
            warn!("session already active; ignoring start");
            return Ok(());
        }
        let mut cfg = self.cfg.clone();
        cfg.validate()?;

        let loudness = self
            .loudness
            .take()
            .ok_or_else(|| anyhow!("loudness source unavailable"))?;
        let source = match self.chunks.take() {
            Some(source) => source,
            None => {
                self.loudness = Some(loudness);
                return Err(anyhow!("chunk source unavailable"));
            }
        };

        let mut engine = SessionEngine::new(cfg.clone(), source);
        if let Err(err) = engine.start() {
            self.chunks = Some(engine.into_source());
            self.loudness = Some(loudness);
            return Err(err);
        }

        self.stop_flag.store(false, Ordering::Relaxed);
        let stop_flag = self.stop_flag.clone();
        self.worker = Some(thread::spawn(move || {
            run_scheduler(cfg, engine, loudness, callbacks, stop_flag)
        }));
        Ok(())
    }

    /// Halt the scheduler, stop the recorder, and reset session state so
    /// the instance can be started again. Safe to call from any state.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.stop_flag.store(true, Ordering::Relaxed);
        match worker.join() {
            Ok((engine, loudness)) => {
                self.chunks = Some(engine.into_source());
                self.loudness = Some(loudness);
            }
            Err(_) => warn!("session scheduler panicked; sources lost"),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One centralized tick that evaluates chunk slicing, loudness sampling,
/// threshold logic, and silence logic together, instead of independently
/// scheduled intervals that drift apart.
fn run_scheduler(
    cfg: SessionConfig,
    mut engine: SessionEngine,
    mut loudness: Box<dyn LoudnessSource + Send>,
    mut callbacks: SessionCallbacks,
    stop_flag: Arc<AtomicBool>,
) -> (SessionEngine, Box<dyn LoudnessSource + Send>) {
    let mut sampler = LoudnessSampler::new();
    let epoch = Instant::now();
    let mut next_sample_ms = cfg.sample_interval_ms;
    let mut next_chunk_ms = cfg.chunk_slice_ms;

    while !stop_flag.load(Ordering::Relaxed) {
        let now_ms = epoch.elapsed().as_millis() as u64;
        // Chunks first, so audio captured up to `now` is visible to any
        // window this tick's sample closes.
        if now_ms >= next_chunk_ms {
            engine.handle_chunk_tick(now_ms);
            while next_chunk_ms <= now_ms {
                next_chunk_ms += cfg.chunk_slice_ms;
            }
        }
        if now_ms >= next_sample_ms {
            let level = sampler.sample(loudness.as_mut());
            engine.handle_sample(now_ms, level, &mut callbacks);
            while next_sample_ms <= now_ms {
                next_sample_ms += cfg.sample_interval_ms;
            }
        }

        // A wakeup that races stop() must not fire more callbacks.
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }
        let now_ms = epoch.elapsed().as_millis() as u64;
        let due_in = next_sample_ms.min(next_chunk_ms).saturating_sub(now_ms);
        thread::sleep(Duration::from_millis(due_in.clamp(1, 50)));
    }

    engine.stop();
    (engine, loudness)
}
