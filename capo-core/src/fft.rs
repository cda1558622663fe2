//! # Spectral Transform Module
//!
//! This module turns raw PCM blocks into magnitude spectra for the pitch
//! estimator. It owns the window table, the frame layout, and the FFT plan,
//! keeping all scratch storage allocated once up front.
//!
//! ## Features
//! - Periodic Hann window table, computed once at startup
//! - Zero-filled framing for blocks shorter than the transform length
//! - Forward FFT via RustFFT with a reusable plan
//! - Full-length magnitude spectrum (the peak search inspects the mirror
//!   half as well, so no bins are discarded here)

use once_cell::sync::Lazy;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Number of samples per spectral frame.
///
/// This also fixes the FFT length and the bin spacing
/// (`sample_rate / FRAME_LEN`). Capture blocks are intentionally shorter
/// than a frame; the remainder of the frame is zero-filled.
pub const FRAME_LEN: usize = 1024;

/// Periodic Hann window coefficients for one frame.
///
/// The table is symmetric about the centre sample, with `HANN[0] = 0` and
/// `HANN[FRAME_LEN / 2] = 1`.
static HANN: Lazy<Vec<f32>> = Lazy::new(|| {
    (0..FRAME_LEN)
        .map(|n| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / FRAME_LEN as f32).cos())
        })
        .collect()
});

/// Fills a complex frame from a PCM block, applying the Hann window.
///
/// Samples beyond the end of the block are zero; samples beyond
/// `FRAME_LEN` are ignored. The imaginary parts are always zero.
///
/// # Arguments
/// * `samples` - PCM block to frame (any length)
/// * `frame` - Output buffer, exactly `FRAME_LEN` long
pub fn windowed_frame(samples: &[i16], frame: &mut [Complex<f32>]) {
    assert_eq!(frame.len(), FRAME_LEN, "frame buffer must be FRAME_LEN long");
    for (n, slot) in frame.iter_mut().enumerate() {
        let sample = samples.get(n).copied().unwrap_or(0) as f32;
        *slot = Complex {
            re: sample * HANN[n],
            im: 0.0,
        };
    }
}

/// Reusable forward transform from PCM blocks to magnitude spectra.
///
/// The FFT plan and both scratch buffers are allocated in the constructor
/// and never resized, so the per-block path is allocation free.
pub struct SpectrumProcessor {
    fft: Arc<dyn Fft<f32>>,
    frame: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectrumProcessor {
    /// Plans the forward FFT and allocates the frame and magnitude scratch.
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(FRAME_LEN),
            frame: vec![Complex { re: 0.0, im: 0.0 }; FRAME_LEN],
            magnitudes: vec![0.0; FRAME_LEN],
        }
    }

    /// Computes the magnitude spectrum of one PCM block.
    ///
    /// The block is windowed and zero-filled into the frame, transformed
    /// in place, and reduced to per-bin magnitudes.
    ///
    /// # Arguments
    /// * `block` - PCM block to analyse
    ///
    /// # Returns
    /// * Magnitudes for all `FRAME_LEN` bins, valid until the next call
    pub fn magnitudes_of(&mut self, block: &[i16]) -> &[f32] {
        windowed_frame(block, &mut self.frame);
        self.fft.process(&mut self.frame);
        for (slot, c) in self.magnitudes.iter_mut().zip(&self.frame) {
            *slot = c.norm(); // .norm() is sqrt(re^2 + im^2)
        }
        &self.magnitudes
    }
}

impl Default for SpectrumProcessor {
    fn default() -> Self {
        Self::new()
    }
}
