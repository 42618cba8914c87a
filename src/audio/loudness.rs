//! Loudness sampling on the normalized 0-100 scale.

/// Frequency/amplitude analysis handle supplied by the environment.
///
/// Implementations fill `bins` with the current frequency-bin magnitudes
/// (one byte per bin, 0-255) and return `true`. Returning `false` means no
/// analysis handle is available, which the sampler reads as loudness 0.
pub trait LoudnessSource {
    fn read_bins(&mut self, bins: &mut Vec<u8>) -> bool;
}

/// Average the bin magnitudes and scale to 0-100.
pub fn loudness_percent(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u32 = bins.iter().map(|&b| u32::from(b)).sum();
    let avg = sum as f32 / bins.len() as f32;
    avg / 255.0 * 100.0
}

/// Reads a [`LoudnessSource`] on each scheduler tick, reusing one bin
/// buffer across reads.
#[derive(Debug, Default)]
pub struct LoudnessSampler {
    bins: Vec<u8>,
}

impl LoudnessSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(&mut self, source: &mut dyn LoudnessSource) -> f32 {
        self.bins.clear();
        if !source.read_bins(&mut self.bins) {
            return 0.0;
        }
        loudness_percent(&self.bins)
    }
}
