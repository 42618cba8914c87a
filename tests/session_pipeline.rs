//! End-to-end pipeline checks against scripted sources: a full speech event
//! driven through the public engine API, and the assembly determinism
//! guarantee that every emitted clip is exactly `headers ++ chunks`.

use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use voicegate::audio::{ChunkSource, LoudnessSource};
use voicegate::{AudioClip, Session, SessionCallbacks, SessionConfig, SessionEngine};

/// Shared handle controlling how many chunks the scripted source may yield
/// and recording every payload it produced.
#[derive(Clone, Default)]
struct ChunkScript {
    armed: Arc<AtomicUsize>,
    produced: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ChunkScript {
    fn arm(&self) {
        self.armed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Yields one deterministic numbered payload per armed slot once started.
struct NumberedChunks {
    started: bool,
    counter: u8,
    script: ChunkScript,
}

impl NumberedChunks {
    fn new(script: ChunkScript) -> Self {
        Self {
            started: false,
            counter: 0,
            script,
        }
    }
}

impl ChunkSource for NumberedChunks {
    fn start(&mut self, _cfg: &SessionConfig) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn poll_chunk(&mut self) -> Option<Vec<u8>> {
        if !self.started {
            return None;
        }
        let take = self
            .script
            .armed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if take.is_err() {
            return None;
        }
        self.counter = self.counter.wrapping_add(1);
        let payload = vec![self.counter; 4];
        self.script.produced.lock().unwrap().push(payload.clone());
        Some(payload)
    }

    fn stop(&mut self) {
        self.started = false;
    }
}

struct ConstantLevel(f32);

impl LoudnessSource for ConstantLevel {
    fn read_bins(&mut self, bins: &mut Vec<u8>) -> bool {
        bins.push((self.0 * 255.0 / 100.0) as u8);
        true
    }
}

fn pipeline_config() -> SessionConfig {
    SessionConfig {
        loudness_threshold: 30.0,
        silence_ms: 1_000,
        preview_ms: 1_000,
        lead_in_ms: 200,
        sample_interval_ms: 100,
        chunk_slice_ms: 100,
        header_chunk_count: 2,
        ..SessionConfig::default()
    }
}

#[test]
fn emitted_clips_are_exactly_headers_then_window_chunks() {
    let script = ChunkScript::default();
    let mut engine = SessionEngine::new(
        pipeline_config(),
        Box::new(NumberedChunks::new(script.clone())),
    );
    engine.start().expect("scripted source starts");

    let previews: Arc<Mutex<Vec<AudioClip>>> = Arc::new(Mutex::new(Vec::new()));
    let completes: Arc<Mutex<Vec<AudioClip>>> = Arc::new(Mutex::new(Vec::new()));
    let mut callbacks = SessionCallbacks {
        on_periodic_volume: Box::new(|_| {}),
        on_preview_clip: {
            let previews = previews.clone();
            Box::new(move |clip| previews.lock().unwrap().push(clip))
        },
        on_complete_clip: {
            let completes = completes.clone();
            Box::new(move |clip| completes.lock().unwrap().push(clip))
        },
    };

    // One chunk and one sample per 100 ms tick; speech from t=1000 to 2000.
    let mut complete_at = None;
    for step in 1..=40u64 {
        let now = step * 100;
        script.arm();
        engine.handle_chunk_tick(now);
        let level = if (1_000..=2_000).contains(&now) { 85.0 } else { 4.0 };
        engine.handle_sample(now, level, &mut callbacks);
        if complete_at.is_none() && !completes.lock().unwrap().is_empty() {
            complete_at = Some(now);
        }
    }

    let previews = previews.lock().unwrap();
    let completes = completes.lock().unwrap();
    assert_eq!(previews.len(), 1);
    assert_eq!(completes.len(), 1);

    // Crossing at t=1000, lead-in 200: both windows start at 800.
    assert_eq!(previews[0].window.start_ms, 800);
    assert_eq!(previews[0].window.end_ms, Some(1_800));
    assert_eq!(completes[0].window.start_ms, 800);
    assert_eq!(completes[0].window.end_ms, None);
    // Silence runs from the first quiet sample after the preview (t=2100).
    assert_eq!(complete_at, Some(3_100));

    // Chunk k was stamped k*100; reconstruct each clip by hand from the
    // payloads the source produced and compare byte-for-byte.
    let produced = script.produced.lock().unwrap();
    let headers: Vec<u8> = produced[..2].concat();

    let mut expected_preview = headers.clone();
    for (idx, payload) in produced.iter().enumerate() {
        let stamp = (idx as u64 + 1) * 100;
        if (800..=1_800).contains(&stamp) {
            expected_preview.extend_from_slice(payload);
        }
    }
    assert_eq!(previews[0].data, expected_preview);

    let complete_at = complete_at.unwrap();
    let mut expected_complete = headers;
    for (idx, payload) in produced.iter().enumerate() {
        let stamp = (idx as u64 + 1) * 100;
        if stamp >= 800 && stamp <= complete_at {
            expected_complete.extend_from_slice(payload);
        }
    }
    assert_eq!(completes[0].data, expected_complete);
    assert_eq!(completes[0].mime, "audio/wav");
}

#[test]
fn live_session_reports_volume_and_stays_quiet_without_speech() {
    let cfg = SessionConfig {
        sample_interval_ms: 10,
        chunk_slice_ms: 10,
        ..pipeline_config()
    };
    let mut session = Session::new(
        cfg,
        Box::new(ConstantLevel(4.0)),
        Box::new(NumberedChunks::new(ChunkScript::default())),
    );

    let volumes = Arc::new(Mutex::new(Vec::new()));
    let clips = Arc::new(Mutex::new(0usize));
    let callbacks = SessionCallbacks {
        on_periodic_volume: {
            let volumes = volumes.clone();
            Box::new(move |level| volumes.lock().unwrap().push(level))
        },
        on_preview_clip: {
            let clips = clips.clone();
            Box::new(move |_| *clips.lock().unwrap() += 1)
        },
        on_complete_clip: {
            let clips = clips.clone();
            Box::new(move |_| *clips.lock().unwrap() += 1)
        },
    };

    session.start(callbacks).expect("session starts");
    std::thread::sleep(std::time::Duration::from_millis(200));
    session.stop();

    let volumes = volumes.lock().unwrap();
    assert!(!volumes.is_empty(), "periodic volume must fire while active");
    assert!(volumes.iter().all(|v| *v < 30.0));
    assert_eq!(*clips.lock().unwrap(), 0, "quiet stream emits no clips");
}
