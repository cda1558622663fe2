// capo-core/src/lib.rs

//! The core logic for the two-node guitar tuning appliance.
//! This crate is responsible for audio block transport, spectral pitch
//! estimation, open-string classification, visual feedback, the command
//! protocol, and measurement smoothing. It is completely headless and
//! contains no hardware driver code; the capture device, the indicator,
//! and the node link are all trait or channel boundaries.

pub mod audio;
pub mod controller;
pub mod feedback;
pub mod fft;
pub mod kalman;
pub mod pitch;
pub mod protocol;
pub mod ring;
pub mod sensor;
pub mod transport;
pub mod tuning;

use crate::tuning::StringNote;

/// Represents the result of analysing a single audio block.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// The interpolated dominant frequency in Hz.
    pub frequency: f32,
    /// The open string the frequency was classified as, if any.
    pub note: Option<StringNote>,
}
