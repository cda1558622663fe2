//! # Capo Rig - Loopback Demo for the Tuning Appliance
//!
//! Runs one sensor node and one controller node in a single process,
//! wired together over the in-memory link, and drives them from a small
//! stdin REPL. The sensor captures from the default microphone when one
//! is available and falls back to a synthesized open A string otherwise,
//! so the whole pipeline can be exercised on any machine.
//!
//! ## Architecture
//! - **Sensor threads**: capture, estimation and command handling, as in
//!   the appliance
//! - **Controller thread**: measurement consumer running the smoother
//! - **Main thread**: REPL that formats and forwards operator commands

use anyhow::Result;
use capo_core::audio::{CaptureDevice, CpalCapture, SineCapture};
use capo_core::feedback::{self, Indicator};
use capo_core::{controller, sensor, transport};
use env_logger::Env;
use log::{info, warn};
use std::io::{self, BufRead, Write};

/// Frequency of the fallback tone, the open A string.
const FALLBACK_TONE_HZ: f32 = 110.0;
/// Peak amplitude of the fallback tone.
const FALLBACK_AMPLITUDE: f32 = 8000.0;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("starting capo rig");

    let (sensor_end, controller_end) = transport::link_pair();

    let controller = controller::start(controller_end)?;
    let sensor = sensor::start(
        capture_factory,
        sensor_end,
        Box::new(ConsoleIndicator { last: None }),
    )?;

    repl(&controller)?;

    info!("shutting down");
    sensor.stop();
    controller.stop();
    Ok(())
}

/// Builds the sensor's capture device on the capture thread.
///
/// Prefers the microphone; when no usable device exists the rig stays
/// functional on a synthesized tone.
fn capture_factory() -> Result<Box<dyn CaptureDevice>> {
    match CpalCapture::new() {
        Ok(device) => Ok(Box::new(device)),
        Err(e) => {
            warn!("microphone unavailable ({e:#}), synthesizing an open A string instead");
            Ok(Box::new(SineCapture::new(
                FALLBACK_TONE_HZ,
                FALLBACK_AMPLITUDE,
            )))
        }
    }
}

/// Indicator that reports color transitions on the log instead of an LED.
struct ConsoleIndicator {
    last: Option<(u8, u8, u8)>,
}

impl Indicator for ConsoleIndicator {
    fn set_color(&mut self, red: u8, green: u8, blue: u8) {
        let color = (red, green, blue);
        if self.last == Some(color) {
            return;
        }
        self.last = Some(color);
        let name = match color {
            feedback::LISTENING => "listening (blue)",
            feedback::MATCH => "match (green)",
            feedback::MISMATCH => "mismatch (red)",
            _ => "custom",
        };
        info!("indicator: {name}");
    }
}

/// Reads operator commands until `quit` or end of input.
fn repl(controller: &controller::ControllerHandle) -> Result<()> {
    print_usage();
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // end of input
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [] => {}
            ["quit"] | ["exit"] => break,
            ["tune", "t", note] => match controller.send_tune(note) {
                Ok(()) => println!("tuning against {note}"),
                Err(e) => println!("{e}"),
            },
            ["tune", "r"] => match controller.send_read() {
                Ok(()) => println!("read mode requested"),
                Err(e) => println!("{e}"),
            },
            ["tune", "s"] => match controller.send_stop() {
                Ok(()) => println!("stop requested"),
                Err(e) => println!("{e}"),
            },
            ["status"] => match controller.latest() {
                Some(update) => println!(
                    "raw {:.2} Hz, filtered {:.2} Hz, note {}",
                    update.raw,
                    update.filtered,
                    update.note.as_deref().unwrap_or("-")
                ),
                None => println!("no measurement yet"),
            },
            _ => print_usage(),
        }
    }
    Ok(())
}

fn print_usage() {
    println!("commands: tune t <NOTE> | tune r | tune s | status | quit");
}
