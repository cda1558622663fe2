//! # Audio Capture Module
//!
//! This module is the boundary to the capture hardware. It defines the
//! block format every other component works in (16 kHz mono 16-bit, one
//! 50 ms block per read) and provides two sources behind one trait: a
//! CPAL-backed microphone and a deterministic synthesized tone.
//!
//! ## Features
//! - Bounded-wait block reads with typed timeout/closed errors
//! - CPAL device and config selection pinned to the appliance rate
//! - Real-time callback that re-blocks the feed and never blocks itself
//! - Synthesized sine source for tests and microphone-less runs

use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use log::{debug, info, warn};
use std::time::Duration;
use thiserror::Error;

/// Capture sample rate in Hz. The whole pipeline is pinned to this rate;
/// a device that cannot supply it is rejected at construction.
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Samples per capture block, one 50 ms period at the capture rate.
///
/// A block is deliberately shorter than the 1024-sample analysis frame;
/// the estimator zero-fills the remainder.
pub const BLOCK_SAMPLES: usize = 800;

/// Bytes per capture block (16-bit mono).
pub const BLOCK_BYTES: usize = BLOCK_SAMPLES * 2;

/// Depth of the queue between the stream callback and `read`, in blocks.
pub const CAPTURE_QUEUE_DEPTH: usize = 8;

/// Errors surfaced by a capture device read.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No block arrived within the allowed wait.
    #[error("timed out waiting for an audio block")]
    Timeout,
    /// The device has shut down and will produce no more blocks.
    #[error("capture device closed")]
    Closed,
}

/// A source of fixed-size PCM blocks.
///
/// Devices are constructed inside the thread that reads them (CPAL
/// streams must stay on one thread), so the trait itself carries no
/// threading requirements.
pub trait CaptureDevice {
    /// Waits up to `timeout` for the next block of `BLOCK_SAMPLES`
    /// samples.
    fn read(&mut self, timeout: Duration) -> Result<Vec<i16>, CaptureError>;
}

/// Microphone-backed capture device.
///
/// The stream callback accumulates whatever the host hands it and slices
/// it into appliance-sized blocks. When the queue is full the freshest
/// block is dropped and counted; the callback never waits.
pub struct CpalCapture {
    blocks: Receiver<Vec<i16>>,
    _stream: cpal::Stream,
}

impl CpalCapture {
    /// Opens the default input device at the appliance rate.
    ///
    /// # Returns
    /// * `Ok(capture)` - Stream is running and blocks are flowing
    /// * `Err(e)` - No device, or no mono 16-bit config at 16 kHz
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("no input device available"))?;

        info!("using audio input device: {}", device.name()?);

        let configs = device.supported_input_configs()?.collect::<Vec<_>>();
        let supported = find_supported_config(configs, SAMPLE_RATE_HZ)
            .ok_or_else(|| anyhow!("no mono i16 input config covering {SAMPLE_RATE_HZ} Hz"))?;
        let config = supported.with_sample_rate(cpal::SampleRate(SAMPLE_RATE_HZ));

        let (block_tx, block_rx) = bounded::<Vec<i16>>(CAPTURE_QUEUE_DEPTH);

        // This buffer accumulates callback data until a full block exists.
        let mut pending: Vec<i16> = Vec::with_capacity(BLOCK_SAMPLES * 2);
        let mut dropped: u64 = 0;

        let stream = device.build_input_stream(
            &config.into(),
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                pending.extend_from_slice(data);
                while pending.len() >= BLOCK_SAMPLES {
                    let block = pending[..BLOCK_SAMPLES].to_vec();
                    if block_tx.try_send(block).is_err() {
                        dropped += 1;
                        debug!("capture queue full, {dropped} blocks dropped so far");
                    }
                    pending.drain(..BLOCK_SAMPLES);
                }
            },
            |err| warn!("audio stream error: {err}"),
            None,
        )?;

        stream.play()?;

        Ok(Self {
            blocks: block_rx,
            _stream: stream,
        })
    }
}

impl CaptureDevice for CpalCapture {
    fn read(&mut self, timeout: Duration) -> Result<Vec<i16>, CaptureError> {
        match self.blocks.recv_timeout(timeout) {
            Ok(block) => Ok(block),
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::Closed),
        }
    }
}

/// Finds an input configuration able to deliver the appliance format.
///
/// # Arguments
/// * `configs` - Supported configurations reported by the device
/// * `target_rate` - Required sample rate in Hz
///
/// # Returns
/// * `Some(config)` - Mono 16-bit range containing the target rate
/// * `None` - The device cannot supply the appliance format
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs.into_iter().find(|c| {
        c.channels() == 1
            && c.sample_format() == cpal::SampleFormat::I16
            && c.min_sample_rate().0 <= target_rate
            && target_rate <= c.max_sample_rate().0
    })
}

/// Deterministic capture device producing a pure tone.
///
/// Phase is continuous across blocks, so consecutive reads splice into
/// one clean sine. Used by the tests and as the demo rig's fallback when
/// no microphone is present.
pub struct SineCapture {
    frequency: f32,
    amplitude: f32,
    phase: f32,
}

impl SineCapture {
    /// Creates a tone source at the given frequency and peak amplitude.
    pub fn new(frequency: f32, amplitude: f32) -> Self {
        Self {
            frequency,
            amplitude,
            phase: 0.0,
        }
    }
}

impl CaptureDevice for SineCapture {
    fn read(&mut self, _timeout: Duration) -> Result<Vec<i16>, CaptureError> {
        let step = 2.0 * std::f32::consts::PI * self.frequency / SAMPLE_RATE_HZ as f32;
        let mut block = Vec::with_capacity(BLOCK_SAMPLES);
        for _ in 0..BLOCK_SAMPLES {
            block.push((self.amplitude * self.phase.sin()) as i16);
            self.phase += step;
            if self.phase > 2.0 * std::f32::consts::PI {
                self.phase -= 2.0 * std::f32::consts::PI;
            }
        }
        Ok(block)
    }
}

/// Serializes a PCM block to little-endian bytes for the ring.
pub fn block_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Rebuilds PCM samples from little-endian ring bytes.
pub fn samples_from_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
