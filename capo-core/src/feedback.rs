//! # Mode & Feedback Module
//!
//! The sensor's operating state machine and its mapping onto the visual
//! indicator. Commands are the only thing that moves the state machine;
//! classification results only ever pick a color.

use crate::protocol::Command;
use crate::tuning::StringNote;
use log::{info, warn};

/// Neutral "listening" color shown in read mode.
pub const LISTENING: (u8, u8, u8) = (0, 0, 255);
/// Color shown when the classified note equals the target.
pub const MATCH: (u8, u8, u8) = (0, 255, 0);
/// Color shown when it does not, or nothing was recognized.
pub const MISMATCH: (u8, u8, u8) = (255, 0, 0);

/// Visual feedback capability of the sensor node.
///
/// The real appliance drives an RGB LED; tests and the demo rig supply
/// their own implementations.
pub trait Indicator: Send {
    /// Drives the indicator to the given color, components 0-255.
    fn set_color(&mut self, red: u8, green: u8, blue: u8);
}

/// Operating mode of the sensor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Free-running: every reading is reported, indicator stays neutral.
    Read,
    /// Each reading is compared against the target note.
    Tune,
}

/// The owned mode/target state, written by command delivery and read by
/// the estimation thread.
#[derive(Debug, Clone)]
pub struct TunerState {
    pub mode: Mode,
    pub target: String,
}

impl TunerState {
    /// Initial state: read mode, no target.
    pub fn new() -> Self {
        Self {
            mode: Mode::Read,
            target: String::new(),
        }
    }

    /// Applies one parsed command.
    ///
    /// Malformed input never reaches this point; the codec rejects it
    /// upstream, so every call either transitions or is the acknowledged
    /// stop no-op.
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Read => {
                info!("mode set to READ");
                self.mode = Mode::Read;
            }
            Command::Tune(target) => {
                info!("mode set to TUNE, target {target}");
                self.mode = Mode::Tune;
                self.target = target;
            }
            Command::Stop => {
                warn!("stop requested, which the sensor does not implement; state unchanged");
            }
        }
    }
}

impl Default for TunerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps one estimation cycle's classification onto the indicator.
///
/// Read mode always shows the listening color. Tune mode compares the
/// classified token against the target by string equality, counting an
/// unrecognized classification as a mismatch.
pub fn update_indicator(
    state: &TunerState,
    note: Option<StringNote>,
    indicator: &mut dyn Indicator,
) {
    let (red, green, blue) = match state.mode {
        Mode::Read => LISTENING,
        Mode::Tune => {
            if note.is_some_and(|n| n.to_string() == state.target) {
                MATCH
            } else {
                MISMATCH
            }
        }
    };
    indicator.set_color(red, green, blue);
}
