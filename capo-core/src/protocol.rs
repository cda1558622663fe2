//! # Command Protocol Module
//!
//! Byte-level codec for the link between the two nodes. Inbound
//! controller→sensor packets carry single-letter commands; outbound
//! sensor→controller packets carry one ASCII measurement line each.
//! The codec owns all input sanitisation, so the state machine and the
//! smoother behind it only ever see well-formed values.

use crate::Reading;
use thiserror::Error;

/// Longest target token carried by a tune command, in bytes.
pub const MAX_TARGET_LEN: usize = 3;

/// Wire bytes for the read-mode command.
pub const READ_COMMAND: &[u8] = b"r\n";
/// Wire bytes for the stop command.
pub const STOP_COMMAND: &[u8] = b"s\n";

/// A parsed controller→sensor command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Switch to free-running read mode.
    Read,
    /// Switch to tuning mode against the given note token.
    Tune(String),
    /// Acknowledged by the sensor but has no effect.
    Stop,
}

/// Errors surfaced by the codec. None of these mutate any state; the
/// caller logs them and drops the packet.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty command packet")]
    EmptyPacket,
    #[error("tune command carries no target note")]
    EmptyTarget,
    #[error("unknown command opcode {0:?}")]
    UnknownOpcode(char),
    #[error("malformed measurement line")]
    BadMeasurement,
}

/// Parses one inbound command packet.
///
/// The first byte selects the command. For a tune command the target is
/// the token after the opcode, with leading spaces skipped, terminated by
/// space, CR, LF or end of packet, and truncated to `MAX_TARGET_LEN`
/// bytes.
pub fn parse_command(bytes: &[u8]) -> Result<Command, ProtocolError> {
    let (&opcode, rest) = bytes.split_first().ok_or(ProtocolError::EmptyPacket)?;
    match opcode {
        b'r' => Ok(Command::Read),
        b's' => Ok(Command::Stop),
        b't' => parse_target(rest).map(Command::Tune),
        other => Err(ProtocolError::UnknownOpcode(other as char)),
    }
}

fn parse_target(rest: &[u8]) -> Result<String, ProtocolError> {
    let start = rest
        .iter()
        .position(|&b| b != b' ')
        .unwrap_or(rest.len());
    let token: Vec<u8> = rest[start..]
        .iter()
        .copied()
        .take_while(|&b| b != b' ' && b != b'\r' && b != b'\n')
        .take(MAX_TARGET_LEN)
        .collect();
    if token.is_empty() {
        return Err(ProtocolError::EmptyTarget);
    }
    Ok(String::from_utf8_lossy(&token).into_owned())
}

/// Formats an outbound tune command for the given note token.
pub fn format_tune_command(note: &str) -> String {
    format!("t {note}\n")
}

/// A parsed sensor→controller measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Raw measured frequency in Hz.
    pub frequency: f32,
    /// Note token the sensor attached, if the pitch was recognized.
    pub note: Option<String>,
}

/// Formats one measurement line: the frequency with one fractional digit,
/// then the note token when one exists.
pub fn format_measurement(reading: &Reading) -> String {
    match &reading.note {
        Some(note) => format!("{:.1} {}\n", reading.frequency, note),
        None => format!("{:.1}\n", reading.frequency),
    }
}

/// Parses one measurement line.
///
/// A frequency-only line is valid and carries no note information. A
/// line whose frequency field is missing, non-numeric or non-finite is
/// rejected so the smoother never sees it.
pub fn parse_measurement(bytes: &[u8]) -> Result<Measurement, ProtocolError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::BadMeasurement)?;
    let mut fields = text.split_whitespace();
    let frequency: f32 = fields
        .next()
        .ok_or(ProtocolError::BadMeasurement)?
        .parse()
        .map_err(|_| ProtocolError::BadMeasurement)?;
    if !frequency.is_finite() {
        return Err(ProtocolError::BadMeasurement);
    }
    let note = fields.next().map(str::to_owned);
    Ok(Measurement { frequency, note })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::StringNote;

    #[test]
    fn tune_command_with_space_parses_the_target() {
        assert_eq!(
            parse_command(b"t E4\n"),
            Ok(Command::Tune("E4".to_string()))
        );
    }

    #[test]
    fn tune_command_without_space_is_equivalent() {
        assert_eq!(
            parse_command(b"tE4\n"),
            Ok(Command::Tune("E4".to_string()))
        );
        assert_eq!(
            parse_command(b"t   G3"),
            Ok(Command::Tune("G3".to_string()))
        );
    }

    #[test]
    fn tune_command_truncates_long_targets() {
        assert_eq!(
            parse_command(b"t E4#5\n"),
            Ok(Command::Tune("E4#".to_string()))
        );
    }

    #[test]
    fn tune_command_without_target_is_rejected() {
        assert_eq!(parse_command(b"t\n"), Err(ProtocolError::EmptyTarget));
        assert_eq!(parse_command(b"t   \n"), Err(ProtocolError::EmptyTarget));
        assert_eq!(parse_command(b"t"), Err(ProtocolError::EmptyTarget));
    }

    #[test]
    fn read_command_ignores_trailing_bytes() {
        assert_eq!(parse_command(b"r\n"), Ok(Command::Read));
        assert_eq!(parse_command(b"r"), Ok(Command::Read));
        assert_eq!(parse_command(b"reset"), Ok(Command::Read));
    }

    #[test]
    fn stop_command_parses() {
        assert_eq!(parse_command(b"s\n"), Ok(Command::Stop));
    }

    #[test]
    fn unknown_and_empty_packets_are_rejected() {
        assert_eq!(parse_command(b""), Err(ProtocolError::EmptyPacket));
        assert_eq!(
            parse_command(b"x E2\n"),
            Err(ProtocolError::UnknownOpcode('x'))
        );
        // Opcodes are case sensitive.
        assert_eq!(
            parse_command(b"T E2\n"),
            Err(ProtocolError::UnknownOpcode('T'))
        );
    }

    #[test]
    fn formatted_commands_round_trip() {
        assert_eq!(format_tune_command("B3"), "t B3\n");
        assert_eq!(
            parse_command(format_tune_command("B3").as_bytes()),
            Ok(Command::Tune("B3".to_string()))
        );
        assert_eq!(parse_command(READ_COMMAND), Ok(Command::Read));
        assert_eq!(parse_command(STOP_COMMAND), Ok(Command::Stop));
    }

    #[test]
    fn measurement_lines_carry_the_optional_note() {
        let recognized = Reading {
            frequency: 246.9,
            note: Some(StringNote { letter: 'B', octave: 3 }),
        };
        assert_eq!(format_measurement(&recognized), "246.9 B3\n");

        let unrecognized = Reading {
            frequency: 441.0,
            note: None,
        };
        assert_eq!(format_measurement(&unrecognized), "441.0\n");
    }

    #[test]
    fn measurement_parsing_tolerates_a_missing_note() {
        let parsed = parse_measurement(b"438.8 A2\n").unwrap();
        assert_eq!(parsed.frequency, 438.8);
        assert_eq!(parsed.note.as_deref(), Some("A2"));

        let bare = parse_measurement(b"440.0\n").unwrap();
        assert_eq!(bare.frequency, 440.0);
        assert_eq!(bare.note, None);

        // A trailing separator without a token is still note-free.
        let trailing = parse_measurement(b"440.0 \n").unwrap();
        assert_eq!(trailing.note, None);
    }

    #[test]
    fn malformed_measurements_are_rejected() {
        assert_eq!(parse_measurement(b""), Err(ProtocolError::BadMeasurement));
        assert_eq!(
            parse_measurement(b"abc\n"),
            Err(ProtocolError::BadMeasurement)
        );
        assert_eq!(
            parse_measurement(b"nan A2\n"),
            Err(ProtocolError::BadMeasurement)
        );
        assert_eq!(
            parse_measurement(b"inf\n"),
            Err(ProtocolError::BadMeasurement)
        );
    }

    #[test]
    fn measurement_round_trip_preserves_both_fields() {
        let reading = Reading {
            frequency: 110.0,
            note: Some(StringNote { letter: 'A', octave: 2 }),
        };
        let line = format_measurement(&reading);
        let parsed = parse_measurement(line.as_bytes()).unwrap();
        assert_eq!(parsed.frequency, 110.0);
        assert_eq!(parsed.note.as_deref(), Some("A2"));
    }
}
