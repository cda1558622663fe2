//! # Controller Node Module
//!
//! The controller side of the appliance: a single consumer loop that
//! parses inbound measurement lines and runs them through the Kalman
//! smoother, plus the validated command surface an operator drives. The
//! smoother state never leaves the consumer thread; the handle exposes
//! only the latest update.

use crate::kalman::Kalman1D;
use crate::protocol::{self, Measurement};
use crate::transport::{LinkEnd, LinkError};
use crate::tuning;
use anyhow::{Result, bail};
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use log::{error, info, warn};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Poll interval of the measurement consumer loop.
pub const MEASUREMENT_POLL: Duration = Duration::from_millis(100);

/// One processed measurement as presented to the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementUpdate {
    /// Frequency as measured by the sensor, in Hz.
    pub raw: f32,
    /// Smoothed frequency after the Kalman update, in Hz.
    pub filtered: f32,
    /// Note token the sensor attached, if any.
    pub note: Option<String>,
}

/// Codec-plus-smoother core of the controller, independent of any
/// threading so it can be driven directly in tests.
pub struct ControllerNode {
    filter: Kalman1D,
}

impl ControllerNode {
    pub fn new() -> Self {
        Self {
            filter: Kalman1D::new(),
        }
    }

    /// Processes one inbound chunk.
    ///
    /// Malformed lines are logged and dropped without touching the
    /// smoother, so a garbage chunk never disturbs the estimate.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Option<MeasurementUpdate> {
        match protocol::parse_measurement(chunk) {
            Ok(Measurement { frequency, note }) => {
                let filtered = self.filter.update(frequency);
                Some(MeasurementUpdate {
                    raw: frequency,
                    filtered,
                    note,
                })
            }
            Err(e) => {
                warn!("measurement rejected: {e}");
                None
            }
        }
    }
}

impl Default for ControllerNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts the controller's consumer thread on the given link end.
pub fn start(link: LinkEnd) -> Result<ControllerHandle> {
    let latest: Arc<Mutex<Option<MeasurementUpdate>>> = Arc::new(Mutex::new(None));
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

    let consumer_link = link.clone();
    let consumer_latest = Arc::clone(&latest);
    let thread = thread::Builder::new()
        .name("measurement-rx".to_string())
        .spawn(move || {
            let mut node = ControllerNode::new();
            while !shutdown_requested(&shutdown_rx) {
                match consumer_link.recv_timeout(MEASUREMENT_POLL) {
                    Ok(chunk) => {
                        if let Some(update) = node.process_chunk(&chunk) {
                            info!(
                                "raw {:.2} Hz, filtered {:.2} Hz",
                                update.raw, update.filtered
                            );
                            *consumer_latest.lock().unwrap() = Some(update);
                        }
                    }
                    Err(LinkError::Timeout) => {}
                    Err(_) => {
                        info!("link closed, measurement thread exiting");
                        break;
                    }
                }
            }
        })?;

    Ok(ControllerHandle {
        link,
        latest,
        shutdown_tx: Some(shutdown_tx),
        thread: Some(thread),
    })
}

fn shutdown_requested(shutdown_rx: &Receiver<()>) -> bool {
    matches!(shutdown_rx.try_recv(), Err(TryRecvError::Disconnected))
}

/// Handle to a running controller node. Dropping it stops the node.
pub struct ControllerHandle {
    link: LinkEnd,
    latest: Arc<Mutex<Option<MeasurementUpdate>>>,
    shutdown_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    /// Requests tuning against the given open-string note.
    ///
    /// The token is validated against the string table before anything
    /// goes on the wire.
    pub fn send_tune(&self, note: &str) -> Result<()> {
        if !tuning::is_open_string_token(note) {
            bail!("unknown note {note:?}, expected one of E2 A2 D3 G3 B3 E4");
        }
        self.link
            .send(protocol::format_tune_command(note).as_bytes())?;
        Ok(())
    }

    /// Requests continuous read mode.
    pub fn send_read(&self) -> Result<()> {
        self.link.send(protocol::READ_COMMAND)?;
        Ok(())
    }

    /// Requests a stop; the sensor acknowledges it as a no-op.
    pub fn send_stop(&self) -> Result<()> {
        self.link.send(protocol::STOP_COMMAND)?;
        Ok(())
    }

    /// Latest processed measurement, if any has arrived yet.
    pub fn latest(&self) -> Option<MeasurementUpdate> {
        self.latest.lock().unwrap().clone()
    }

    /// Stops the consumer thread and waits for it to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.shutdown_tx.take());
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("controller thread panicked during shutdown");
            }
        }
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
