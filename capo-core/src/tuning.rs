//! # String Tuning Module
//!
//! This module provides the musical reference data and note classification
//! for standard six-string guitar tuning. It maps measured frequencies to
//! open-string notes, folding by octaves so harmonics and fretted octaves
//! of a string are still named after it.
//!
//! ## Features
//! - Fixed six-entry open-string reference table (E2 to E4)
//! - Octave folding via `round(log2(f / open))`
//! - Relative acceptance gate (6 % of the measured frequency)
//! - Audible range rejection outside 70 Hz to 4000 Hz

use std::fmt;

/// Lowest frequency the classifier will attempt to name, in Hz.
pub const MIN_CLASSIFY_HZ: f32 = 70.0;
/// Highest frequency the classifier will attempt to name, in Hz.
pub const MAX_CLASSIFY_HZ: f32 = 4000.0;

/// Largest relative error accepted when matching a folded candidate.
const ACCEPT_RATIO: f32 = 0.06;

/// One open string of the instrument.
#[derive(Debug, Clone, Copy)]
pub struct GuitarString {
    /// Letter name of the string.
    pub letter: char,
    /// Octave of the open string in scientific pitch notation.
    pub base_octave: i8,
    /// Open-string frequency in Hz.
    pub open_hz: f32,
}

/// The six open strings in standard tuning, low to high.
pub const OPEN_STRINGS: [GuitarString; 6] = [
    GuitarString { letter: 'E', base_octave: 2, open_hz: 82.407 },
    GuitarString { letter: 'A', base_octave: 2, open_hz: 110.000 },
    GuitarString { letter: 'D', base_octave: 3, open_hz: 146.832 },
    GuitarString { letter: 'G', base_octave: 3, open_hz: 196.000 },
    GuitarString { letter: 'B', base_octave: 3, open_hz: 246.942 },
    GuitarString { letter: 'E', base_octave: 4, open_hz: 329.628 },
];

/// A classified note: string letter plus sounding octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringNote {
    pub letter: char,
    pub octave: i8,
}

impl fmt::Display for StringNote {
    /// Formats the note as its short token, e.g. "E2" or "A4".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter, self.octave)
    }
}

/// Classifies a frequency as an octave of one of the open strings.
///
/// Each table entry is folded to the octave nearest the input, the entry
/// with the smallest absolute error wins (earlier entries win ties), and
/// the winner is only accepted when its error is within 6 % of the input.
///
/// # Arguments
/// * `frequency` - Measured frequency in Hz
///
/// # Returns
/// * `Some(note)` - The matched string letter and sounding octave
/// * `None` - Out of range, or no fold lands close enough
pub fn classify(frequency: f32) -> Option<StringNote> {
    if frequency < MIN_CLASSIFY_HZ || frequency > MAX_CLASSIFY_HZ {
        return None;
    }

    let mut best_error = f32::INFINITY;
    let mut best_note = None;
    for string in &OPEN_STRINGS {
        let k = (frequency / string.open_hz).log2().round();
        let candidate = string.open_hz * 2.0_f32.powi(k as i32);
        let error = (frequency - candidate).abs();
        if error < best_error {
            best_error = error;
            best_note = Some(StringNote {
                letter: string.letter,
                octave: string.base_octave + k as i8,
            });
        }
    }

    if best_error > frequency * ACCEPT_RATIO {
        return None;
    }
    best_note
}

/// Returns true when `token` names one of the six open strings.
///
/// This is the whitelist used when validating tune commands before they
/// are sent to the sensor.
pub fn is_open_string_token(token: &str) -> bool {
    OPEN_STRINGS.iter().any(|string| {
        let note = StringNote {
            letter: string.letter,
            octave: string.base_octave,
        };
        note.to_string() == token
    })
}
