//! # Spectral Pitch Estimation Module
//!
//! This module implements the per-cycle pitch estimator for the sensor
//! node. Each capture block is framed and transformed by the spectral
//! processor, the dominant bin is located with a mirror-aware two-pass
//! search, and the bin index is refined to sub-bin precision with
//! parabolic interpolation.
//!
//! ## Features
//! - Allocation-free estimation path after construction
//! - Two-pass peak search that rejects mirror-half winners
//! - Parabolic interpolation for sub-bin accuracy
//! - Stateless between cycles; one frequency out per block in

use crate::fft::{FRAME_LEN, SpectrumProcessor};

/// Per-cycle pitch estimator owning the transform and its scratch space.
pub struct PitchEstimator {
    spectrum: SpectrumProcessor,
    sample_rate: u32,
}

impl PitchEstimator {
    /// Creates an estimator for the given capture sample rate.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            spectrum: SpectrumProcessor::new(),
            sample_rate,
        }
    }

    /// Estimates the dominant frequency of one PCM block.
    ///
    /// The block is windowed and zero-filled to the frame length, so
    /// blocks shorter than `FRAME_LEN` are expected. Interpolation is
    /// only applied when the winning bin has both neighbours inside the
    /// usable lower half of the spectrum.
    ///
    /// # Arguments
    /// * `block` - PCM block to analyse
    ///
    /// # Returns
    /// * Estimated frequency in Hz
    pub fn estimate(&mut self, block: &[i16]) -> f32 {
        let magnitudes = self.spectrum.magnitudes_of(block);
        let bin = dominant_bin(magnitudes);

        let delta = if bin > 0 && bin < FRAME_LEN / 2 - 1 {
            parabolic_delta(magnitudes[bin - 1], magnitudes[bin], magnitudes[bin + 1])
        } else {
            0.0
        };

        (bin as f32 + delta) * self.sample_rate as f32 / FRAME_LEN as f32
    }
}

/// Locates the dominant magnitude bin with a two-pass search.
///
/// The first pass scans the entire spectrum. A real input mirrors its
/// energy above half the spectrum; if the first pass lands strictly above
/// the halfway bin, the search is repeated over the lower half with the
/// DC bin excluded and that winner is taken instead.
///
/// # Arguments
/// * `magnitudes` - Magnitude spectrum, all bins
///
/// # Returns
/// * Index of the winning bin
pub fn dominant_bin(magnitudes: &[f32]) -> usize {
    let half = magnitudes.len() / 2;

    let mut peak_index = 0;
    let mut peak_value = 0.0_f32;
    for (i, &value) in magnitudes.iter().enumerate() {
        if value > peak_value {
            peak_value = value;
            peak_index = i;
        }
    }

    if peak_index > half {
        peak_index = 0;
        peak_value = 0.0;
        for (i, &value) in magnitudes.iter().enumerate().take(half).skip(1) {
            if value > peak_value {
                peak_value = value;
                peak_index = i;
            }
        }
    }

    peak_index
}

/// Sub-bin peak offset from a quadratic fit through three magnitudes.
///
/// Fits a parabola through the winning bin and its neighbours and
/// returns the fractional offset of the vertex, in bins, relative to the
/// centre. A zero denominator (flat neighbourhood) yields zero.
///
/// # Arguments
/// * `alpha` - Magnitude of the bin below the peak
/// * `beta` - Magnitude of the peak bin
/// * `gamma` - Magnitude of the bin above the peak
///
/// # Returns
/// * Fractional bin offset in roughly [-0.5, 0.5]
pub fn parabolic_delta(alpha: f32, beta: f32, gamma: f32) -> f32 {
    let denominator = alpha - 2.0 * beta + gamma;
    if denominator == 0.0 {
        return 0.0;
    }
    0.5 * (alpha - gamma) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning;

    const SAMPLE_RATE: u32 = 16_000;

    fn sine_block(frequency: f32, amplitude: f32, len: usize) -> Vec<i16> {
        (0..len)
            .map(|n| {
                let phase =
                    2.0 * std::f32::consts::PI * frequency * n as f32 / SAMPLE_RATE as f32;
                (amplitude * phase.sin()) as i16
            })
            .collect()
    }

    #[test]
    fn parabolic_delta_is_zero_for_symmetric_neighbours() {
        assert_eq!(parabolic_delta(1.0, 3.0, 1.0), 0.0);
    }

    #[test]
    fn parabolic_delta_handles_flat_neighbourhood() {
        assert_eq!(parabolic_delta(2.0, 2.0, 2.0), 0.0);
    }

    #[test]
    fn parabolic_delta_leans_towards_the_larger_neighbour() {
        let delta = parabolic_delta(1.0, 3.0, 2.0);
        assert!(delta > 0.0 && delta <= 0.5);
        let delta = parabolic_delta(2.0, 3.0, 1.0);
        assert!(delta < 0.0 && delta >= -0.5);
    }

    #[test]
    fn dominant_bin_takes_the_overall_peak_in_the_lower_half() {
        let mut magnitudes = vec![0.0; FRAME_LEN];
        magnitudes[10] = 5.0;
        magnitudes[300] = 3.0;
        assert_eq!(dominant_bin(&magnitudes), 10);
    }

    #[test]
    fn dominant_bin_rejects_a_mirror_half_winner() {
        let mut magnitudes = vec![0.0; FRAME_LEN];
        magnitudes[700] = 9.0; // mirror image
        magnitudes[300] = 3.0;
        assert_eq!(dominant_bin(&magnitudes), 300);
    }

    #[test]
    fn dominant_bin_keeps_the_halfway_bin() {
        let mut magnitudes = vec![0.0; FRAME_LEN];
        magnitudes[FRAME_LEN / 2] = 4.0;
        assert_eq!(dominant_bin(&magnitudes), FRAME_LEN / 2);
    }

    #[test]
    fn dominant_bin_falls_back_to_zero_when_the_lower_half_is_silent() {
        let mut magnitudes = vec![0.0; FRAME_LEN];
        magnitudes[900] = 2.0;
        assert_eq!(dominant_bin(&magnitudes), 0);
    }

    #[test]
    fn on_bin_sine_is_estimated_almost_exactly() {
        // 125 Hz sits exactly on bin 8 at 16 kHz / 1024.
        let block = sine_block(125.0, 8000.0, FRAME_LEN);
        let mut estimator = PitchEstimator::new(SAMPLE_RATE);
        let estimate = estimator.estimate(&block);
        assert!((estimate - 125.0).abs() < 0.1, "estimate {estimate}");
    }

    #[test]
    fn open_a_string_resolves_within_one_hertz_and_classifies_as_a2() {
        let block = sine_block(110.0, 8000.0, FRAME_LEN);
        let mut estimator = PitchEstimator::new(SAMPLE_RATE);
        let estimate = estimator.estimate(&block);
        assert!((estimate - 110.0).abs() < 1.0, "estimate {estimate}");

        let note = tuning::classify(estimate).expect("A2 should be recognized");
        assert_eq!(note.to_string(), "A2");
    }

    #[test]
    fn short_zero_filled_block_still_finds_the_right_string() {
        // A capture block is shorter than the frame; zero-fill widens the
        // peak but must not move it off the open G string.
        let block = sine_block(196.0, 8000.0, 800);
        let mut estimator = PitchEstimator::new(SAMPLE_RATE);
        let estimate = estimator.estimate(&block);
        assert!((estimate - 196.0).abs() < 10.0, "estimate {estimate}");

        let note = tuning::classify(estimate).expect("G3 should be recognized");
        assert_eq!(note.to_string(), "G3");
    }
}
