//! # Sensor Node Module
//!
//! Orchestration of the sensor side of the appliance: the capture thread
//! that feeds the PCM ring, the estimation thread that turns ring bytes
//! into classified measurements and indicator updates, and the command
//! thread that applies inbound protocol packets to the shared state.
//!
//! ## Architecture
//! - **audio-capture**: device reads with a bounded wait, ring writes
//!   with drop-on-backpressure, fixed cycle delay
//! - **pitch-estimation**: claim/commit block assembly, the full
//!   estimate→classify→indicate pipeline, one measurement line per cycle
//! - **command-rx**: bounded-poll link receive, codec parse, state apply
//! - Shutdown is cooperative: the handle drops its sender and every
//!   thread observes the disconnect on its next poll

use crate::Reading;
use crate::audio::{self, BLOCK_BYTES, CaptureDevice, CaptureError, SAMPLE_RATE_HZ};
use crate::feedback::{self, Indicator, TunerState};
use crate::pitch::PitchEstimator;
use crate::protocol;
use crate::ring;
use crate::transport::{LinkEnd, LinkError};
use crate::tuning;
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest wait for one capture block before the cycle is skipped.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);
/// Delay between capture cycles.
pub const CYCLE_DELAY: Duration = Duration::from_millis(50);
/// Poll interval while the estimation thread waits for a full block.
pub const CLAIM_POLL: Duration = Duration::from_millis(1);
/// Poll interval of the command thread's link receive.
pub const COMMAND_POLL: Duration = Duration::from_millis(100);
/// Ring capacity in capture blocks.
pub const RING_BLOCKS: usize = 2;

/// Starts the sensor node's three threads.
///
/// The capture device is built by `capture_factory` inside the capture
/// thread, because CPAL streams must live on the thread that uses them.
/// A factory failure is logged and disables capture; the other threads
/// keep serving commands.
///
/// # Arguments
/// * `capture_factory` - Builds the capture device on the capture thread
/// * `link` - Sensor end of the node link
/// * `indicator` - Visual feedback sink, owned by the estimation thread
///
/// # Returns
/// * `Ok(handle)` - All threads running
/// * `Err(e)` - A thread could not be spawned
pub fn start<F>(
    capture_factory: F,
    link: LinkEnd,
    indicator: Box<dyn Indicator>,
) -> Result<SensorHandle>
where
    F: FnOnce() -> Result<Box<dyn CaptureDevice>> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    let state = Arc::new(Mutex::new(TunerState::new()));
    let (ring_tx, ring_rx) = ring::pcm_ring(BLOCK_BYTES * RING_BLOCKS);

    let capture_thread = spawn_capture(capture_factory, ring_tx, shutdown_rx.clone())?;
    let estimation_thread = spawn_estimation(
        ring_rx,
        Arc::clone(&state),
        link.clone(),
        indicator,
        shutdown_rx.clone(),
    )?;
    let command_thread = spawn_command_rx(link, state, shutdown_rx)?;

    Ok(SensorHandle {
        shutdown_tx: Some(shutdown_tx),
        threads: vec![capture_thread, estimation_thread, command_thread],
    })
}

/// Handle to a running sensor node. Dropping it stops the node.
pub struct SensorHandle {
    shutdown_tx: Option<Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl SensorHandle {
    /// Stops all threads and waits for them to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender disconnects every thread's shutdown probe.
        drop(self.shutdown_tx.take());
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("sensor thread panicked during shutdown");
            }
        }
    }
}

impl Drop for SensorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn shutdown_requested(shutdown_rx: &Receiver<()>) -> bool {
    matches!(shutdown_rx.try_recv(), Err(TryRecvError::Disconnected))
}

fn spawn_capture<F>(
    capture_factory: F,
    mut ring_tx: ring::RingProducer,
    shutdown_rx: Receiver<()>,
) -> Result<JoinHandle<()>>
where
    F: FnOnce() -> Result<Box<dyn CaptureDevice>> + Send + 'static,
{
    let handle = thread::Builder::new()
        .name("audio-capture".to_string())
        .spawn(move || {
            let mut device = match capture_factory() {
                Ok(device) => device,
                Err(e) => {
                    error!("capture device setup failed: {e:#}");
                    return;
                }
            };
            info!("audio capture running");

            let mut rejected_bytes: u64 = 0;
            while !shutdown_requested(&shutdown_rx) {
                match device.read(READ_TIMEOUT) {
                    Ok(block) => {
                        let bytes = audio::block_to_bytes(&block);
                        let accepted = ring_tx.write(&bytes);
                        if accepted < bytes.len() {
                            rejected_bytes += (bytes.len() - accepted) as u64;
                            debug!(
                                "ring full, dropped {} bytes ({rejected_bytes} total)",
                                bytes.len() - accepted
                            );
                        }
                    }
                    Err(CaptureError::Timeout) => {
                        debug!("no audio block within {READ_TIMEOUT:?}");
                    }
                    Err(CaptureError::Closed) => {
                        warn!("capture device closed, capture thread exiting");
                        break;
                    }
                }
                thread::sleep(CYCLE_DELAY);
            }
        })?;
    Ok(handle)
}

fn spawn_estimation(
    mut ring_rx: ring::RingConsumer,
    state: Arc<Mutex<TunerState>>,
    link: LinkEnd,
    mut indicator: Box<dyn Indicator>,
    shutdown_rx: Receiver<()>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("pitch-estimation".to_string())
        .spawn(move || {
            let mut estimator = PitchEstimator::new(SAMPLE_RATE_HZ);
            let mut staging: Vec<u8> = Vec::with_capacity(BLOCK_BYTES);

            let (red, green, blue) = feedback::LISTENING;
            indicator.set_color(red, green, blue);

            while !shutdown_requested(&shutdown_rx) {
                if ring_rx.available() < BLOCK_BYTES {
                    thread::sleep(CLAIM_POLL);
                    continue;
                }

                // Assemble exactly one block; a wrapped ring hands it
                // over in two claims.
                staging.clear();
                while staging.len() < BLOCK_BYTES {
                    let claimed = ring_rx.read_claim(BLOCK_BYTES - staging.len());
                    if claimed.is_empty() {
                        break;
                    }
                    let taken = claimed.len();
                    staging.extend_from_slice(claimed);
                    ring_rx.read_commit(taken);
                }
                if staging.len() < BLOCK_BYTES {
                    continue;
                }

                let block = audio::samples_from_bytes(&staging);
                let frequency = estimator.estimate(&block);
                let note = tuning::classify(frequency);

                {
                    let state = state.lock().unwrap();
                    feedback::update_indicator(&state, note, indicator.as_mut());
                }

                let reading = Reading { frequency, note };
                let line = protocol::format_measurement(&reading);
                if let Err(e) = link.send(line.as_bytes()) {
                    warn!("measurement send failed: {e}");
                }
            }
        })?;
    Ok(handle)
}

fn spawn_command_rx(
    link: LinkEnd,
    state: Arc<Mutex<TunerState>>,
    shutdown_rx: Receiver<()>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("command-rx".to_string())
        .spawn(move || {
            while !shutdown_requested(&shutdown_rx) {
                match link.recv_timeout(COMMAND_POLL) {
                    Ok(chunk) => match protocol::parse_command(&chunk) {
                        Ok(command) => state.lock().unwrap().apply(command),
                        Err(e) => warn!("command rejected: {e}"),
                    },
                    Err(LinkError::Timeout) => {}
                    Err(_) => {
                        info!("link closed, command thread exiting");
                        break;
                    }
                }
            }
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SineCapture;
    use crate::feedback::{LISTENING, MATCH, MISMATCH};
    use crate::transport::link_pair;
    use std::time::Instant;

    struct SharedIndicator(Arc<Mutex<Vec<(u8, u8, u8)>>>);

    impl Indicator for SharedIndicator {
        fn set_color(&mut self, red: u8, green: u8, blue: u8) {
            self.0.lock().unwrap().push((red, green, blue));
        }
    }

    fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if condition() {
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
        panic!("timed out waiting for {what}");
    }

    #[test]
    fn node_streams_measurements_and_honors_commands() {
        let (node_end, test_end) = link_pair();
        let colors: Arc<Mutex<Vec<(u8, u8, u8)>>> = Arc::new(Mutex::new(Vec::new()));

        let handle = start(
            || Ok(Box::new(SineCapture::new(110.0, 8000.0)) as Box<dyn CaptureDevice>),
            node_end,
            Box::new(SharedIndicator(Arc::clone(&colors))),
        )
        .unwrap();

        // Measurements flow and name the open A string.
        let mut recognized = None;
        wait_for("an A2 measurement", || {
            while let Ok(chunk) = test_end.recv_timeout(Duration::from_millis(50)) {
                if let Ok(m) = protocol::parse_measurement(&chunk) {
                    if m.note.as_deref() == Some("A2") {
                        recognized = Some(m);
                        return true;
                    }
                }
            }
            false
        });
        let measurement = recognized.unwrap();
        assert!(
            (measurement.frequency - 110.0).abs() < 6.0,
            "frequency {}",
            measurement.frequency
        );

        // The indicator starts on the listening color.
        assert_eq!(colors.lock().unwrap().first(), Some(&LISTENING));

        // Tuning against E2 mismatches a 110 Hz tone.
        test_end.send(b"t E2\n").unwrap();
        wait_for("a mismatch color", || {
            colors.lock().unwrap().last() == Some(&MISMATCH)
        });

        // Tuning against A2 matches it.
        test_end.send(b"t A2\n").unwrap();
        wait_for("a match color", || {
            colors.lock().unwrap().last() == Some(&MATCH)
        });

        // Back to read mode: neutral again.
        test_end.send(b"r\n").unwrap();
        wait_for("the listening color", || {
            colors.lock().unwrap().last() == Some(&LISTENING)
        });

        handle.stop();
    }

    #[test]
    fn malformed_commands_leave_the_node_running() {
        let (node_end, test_end) = link_pair();
        let colors: Arc<Mutex<Vec<(u8, u8, u8)>>> = Arc::new(Mutex::new(Vec::new()));

        let handle = start(
            || Ok(Box::new(SineCapture::new(196.0, 8000.0)) as Box<dyn CaptureDevice>),
            node_end,
            Box::new(SharedIndicator(Arc::clone(&colors))),
        )
        .unwrap();

        test_end.send(b"x nonsense\n").unwrap();
        test_end.send(b"t\n").unwrap();

        // Still in read mode, still measuring.
        wait_for("a measurement after bad commands", || {
            test_end.recv_timeout(Duration::from_millis(50)).is_ok()
        });
        assert_eq!(colors.lock().unwrap().last(), Some(&LISTENING));

        handle.stop();
    }

    #[test]
    fn capture_setup_failure_keeps_the_command_thread_alive() {
        let (node_end, test_end) = link_pair();
        let colors: Arc<Mutex<Vec<(u8, u8, u8)>>> = Arc::new(Mutex::new(Vec::new()));

        let handle = start(
            || Err(anyhow::anyhow!("no such device")),
            node_end,
            Box::new(SharedIndicator(Arc::clone(&colors))),
        )
        .unwrap();

        // Commands are still consumed even though nothing is measuring.
        test_end.send(b"t E4\n").unwrap();
        thread::sleep(Duration::from_millis(300));
        assert!(matches!(
            test_end.recv_timeout(Duration::from_millis(50)),
            Err(LinkError::Timeout)
        ));

        handle.stop();
    }
}
