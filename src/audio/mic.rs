//! System microphone source via CPAL.
//!
//! Implements both environment seams against real hardware: a
//! [`ChunkSource`] that packs the input stream into fixed-slice i16 mono
//! chunks (with a streaming WAV header as the header chunk when the
//! container is `audio/wav`), and a [`LoudnessSource`] fed with magnitude
//! bytes computed on the capture callback.

use super::loudness::LoudnessSource;
use super::recorder::ChunkSource;
use crate::config::SessionConfig;
use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Frames buffered between the capture callback and `poll_chunk`.
const CHANNEL_CAPACITY: usize = 64;

/// Magnitude bytes retained for the loudness side.
const BIN_CAPACITY: usize = 32;

/// How long `start` waits for the capture stream to come up.
const STREAM_START_TIMEOUT: Duration = Duration::from_secs(2);

/// List microphone names so hosts can expose a device selector.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.input_devices().context("no input devices available")?;
    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            names.push(name);
        }
    }
    Ok(names)
}

/// Acquire a microphone and return its two session-facing halves.
///
/// Device lookup failures surface here; the capture stream itself is not
/// built until the session starts.
pub fn open_microphone(
    preferred_device: Option<&str>,
) -> Result<(MicChunkSource, MicLoudnessSource)> {
    let host = cpal::default_host();
    let device = match preferred_device {
        Some(name) => {
            let mut devices = host.input_devices().context("no input devices available")?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow!("input device '{name}' not found"))?
        }
        None => host
            .default_input_device()
            .context("no default input device available")?,
    };
    let shared = Arc::new(MicShared::default());
    let loudness = MicLoudnessSource {
        shared: shared.clone(),
    };
    let chunks = MicChunkSource {
        device,
        shared,
        frames: None,
        pending: Vec::new(),
        samples_per_chunk: 0,
        header_pending: None,
        stop_flag: Arc::new(AtomicBool::new(false)),
        dropped: Arc::new(AtomicUsize::new(0)),
        worker: None,
    };
    Ok((chunks, loudness))
}

#[derive(Default)]
struct MicShared {
    active: AtomicBool,
    bins: Mutex<VecDeque<u8>>,
}

/// Loudness half of the microphone: reads the magnitude bytes the capture
/// callback last produced.
pub struct MicLoudnessSource {
    shared: Arc<MicShared>,
}

impl LoudnessSource for MicLoudnessSource {
    fn read_bins(&mut self, bins: &mut Vec<u8>) -> bool {
        if !self.shared.active.load(Ordering::Relaxed) {
            return false;
        }
        if let Ok(recent) = self.shared.bins.lock() {
            bins.extend(recent.iter().copied());
        }
        true
    }
}

/// Chunk half of the microphone.
pub struct MicChunkSource {
    device: cpal::Device,
    shared: Arc<MicShared>,
    frames: Option<Receiver<Vec<f32>>>,
    pending: Vec<f32>,
    samples_per_chunk: usize,
    header_pending: Option<Vec<u8>>,
    stop_flag: Arc<AtomicBool>,
    dropped: Arc<AtomicUsize>,
    worker: Option<thread::JoinHandle<()>>,
}

impl MicChunkSource {
    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }
}

impl ChunkSource for MicChunkSource {
    fn start(&mut self, cfg: &SessionConfig) -> Result<()> {
        let wants_header = match cfg.container_mime.as_str() {
            "audio/wav" => true,
            "audio/pcm" | "audio/l16" => false,
            other => bail!("container '{other}' is not supported by the cpal recorder"),
        };

        let default_config = self
            .device
            .default_input_config()
            .context("no input config available; check microphone permissions")?;
        let format = default_config.sample_format();
        let stream_config: StreamConfig = default_config.into();
        let sample_rate = stream_config.sample_rate.0;
        let channels = usize::from(stream_config.channels.max(1));

        if cfg.echo_cancellation || cfg.noise_suppression || cfg.auto_gain {
            tracing::debug!(
                "input conditioning flags requested; cpal exposes no echo/noise/AGC controls"
            );
        }

        self.samples_per_chunk =
            ((u64::from(sample_rate) * cfg.chunk_slice_ms) / 1000).max(1) as usize;
        self.pending.clear();
        self.dropped.store(0, Ordering::Relaxed);
        self.stop_flag.store(false, Ordering::Relaxed);

        let (sender, receiver) = bounded::<Vec<f32>>(CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let pump = FramePump {
            scratch: Vec::new(),
            channels,
            sender,
            shared: self.shared.clone(),
            dropped: self.dropped.clone(),
        };
        let device = self.device.clone();
        let stop_flag = self.stop_flag.clone();
        let worker = thread::spawn(move || {
            run_capture_stream(device, stream_config, format, pump, stop_flag, ready_tx);
        });

        match ready_rx.recv_timeout(STREAM_START_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = worker.join();
                return Err(err).context("failed to start capture stream");
            }
            Err(_) => {
                self.stop_flag.store(true, Ordering::Relaxed);
                let _ = worker.join();
                bail!("timed out waiting for the capture stream to start");
            }
        }

        self.frames = Some(receiver);
        self.header_pending = wants_header.then(|| wav_stream_header(sample_rate));
        self.worker = Some(worker);
        self.shared.active.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn poll_chunk(&mut self) -> Option<Vec<u8>> {
        if let Some(header) = self.header_pending.take() {
            return Some(header);
        }
        let receiver = self.frames.as_ref()?;
        while let Ok(frame) = receiver.try_recv() {
            self.pending.extend_from_slice(&frame);
        }
        if self.pending.len() < self.samples_per_chunk {
            return None;
        }
        let samples: Vec<f32> = self.pending.drain(..self.samples_per_chunk).collect();
        Some(pack_i16_le(&samples))
    }

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.shared.active.store(false, Ordering::Relaxed);
        if let Ok(mut bins) = self.shared.bins.lock() {
            bins.clear();
        }
        self.frames = None;
        self.pending.clear();
        self.header_pending = None;
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            tracing::warn!(dropped, "capture callback buffers dropped during session");
        }
    }
}

/// Moves capture-callback data into the session: downmixes to mono, records
/// a magnitude byte for the loudness side, and forwards the samples.
struct FramePump {
    scratch: Vec<f32>,
    channels: usize,
    sender: Sender<Vec<f32>>,
    shared: Arc<MicShared>,
    dropped: Arc<AtomicUsize>,
}

impl FramePump {
    fn push<T, F>(&mut self, data: &[T], convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        self.scratch.clear();
        append_downmixed_samples(&mut self.scratch, data, self.channels, convert);
        if self.scratch.is_empty() {
            return;
        }

        let peak = self
            .scratch
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
            .min(1.0);
        if let Ok(mut bins) = self.shared.bins.lock() {
            bins.push_back((peak * 255.0) as u8);
            while bins.len() > BIN_CAPACITY {
                bins.pop_front();
            }
        }

        match self.sender.try_send(std::mem::take(&mut self.scratch)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Owns the CPAL stream for its whole life; streams are not `Send`, so the
/// stream never leaves this thread.
fn run_capture_stream(
    device: cpal::Device,
    config: StreamConfig,
    format: SampleFormat,
    mut pump: FramePump,
    stop_flag: Arc<AtomicBool>,
    ready_tx: Sender<Result<()>>,
) {
    let err_fn = |err| tracing::debug!("audio_stream_error: {err}");
    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _| pump.push(data, |sample| sample),
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _| pump.push(data, |sample| sample as f32 / 32_768.0),
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _| {
                pump.push(data, |sample| (sample as f32 - 32_768.0) / 32_768.0)
            },
            err_fn,
            None,
        ),
        other => {
            let _ = ready_tx.send(Err(anyhow!("unsupported sample format: {other:?}")));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready_tx.send(Err(err.into()));
            return;
        }
    };
    if let Err(err) = stream.play() {
        let _ = ready_tx.send(Err(err.into()));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    while !stop_flag.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(25));
    }
    if let Err(err) = stream.pause() {
        tracing::debug!("failed to pause audio stream: {err}");
    }
}

/// Downmix multi-channel input to mono while applying the converter, so the
/// rest of the pipeline sees a single channel regardless of mic layout.
fn append_downmixed_samples<T, F>(buf: &mut Vec<f32>, data: &[T], channels: usize, mut convert: F)
where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }

    let mut acc = 0.0f32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += convert(sample);
        count += 1;
        if count == channels {
            buf.push(acc / channels as f32);
            acc = 0.0;
            count = 0;
        }
    }
    if count > 0 {
        buf.push(acc / count as f32);
    }
}

fn pack_i16_le(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = (sample.clamp(-1.0, 1.0) * 32_767.0) as i16;
        bytes.extend_from_slice(&clamped.to_le_bytes());
    }
    bytes
}

/// Minimal streaming WAV header (16-bit mono PCM) with unknown-length size
/// fields, the convention for live WAV streams.
fn wav_stream_header(sample_rate: u32) -> Vec<u8> {
    const UNKNOWN: u32 = u32::MAX;
    let byte_rate = sample_rate * 2;
    let mut header = Vec::with_capacity(44);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&UNKNOWN.to_le_bytes());
    header.extend_from_slice(b"WAVE");
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes()); // PCM
    header.extend_from_slice(&1u16.to_le_bytes()); // mono
    header.extend_from_slice(&sample_rate.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&2u16.to_le_bytes()); // block align
    header.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    header.extend_from_slice(b"data");
    header.extend_from_slice(&UNKNOWN.to_le_bytes());
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_is_44_bytes_with_rate_embedded() {
        let header = wav_stream_header(48_000);
        assert_eq!(header.len(), 44);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        let rate = u32::from_le_bytes([header[24], header[25], header[26], header[27]]);
        assert_eq!(rate, 48_000);
    }

    #[test]
    fn pack_i16_le_clamps_out_of_range_samples() {
        let bytes = pack_i16_le(&[0.0, 1.5, -1.5]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -i16::MAX);
    }

    #[test]
    fn downmixes_stereo_to_mono() {
        let mut buf = Vec::new();
        append_downmixed_samples(&mut buf, &[1.0f32, -1.0, 0.5, 0.5], 2, |s| s);
        assert_eq!(buf, vec![0.0, 0.5]);
    }

    #[test]
    fn preserves_mono_input() {
        let mut buf = Vec::new();
        append_downmixed_samples(&mut buf, &[0.1f32, 0.2, 0.3], 1, |s| s);
        assert_eq!(buf, vec![0.1, 0.2, 0.3]);
    }
}
