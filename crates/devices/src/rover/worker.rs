//! Serial read worker
//!
//! Runs on a dedicated OS thread: the serial port API is blocking. The
//! thread owns the read handle and the reconnect policy. On any read failure
//! it drops the handle, empties the shared writer slot, waits a fixed backoff
//! and reopens. Decoded telemetry and link transitions are sent over a flume
//! channel to the async side. A transition is sent once per change, so a
//! port that is missing at startup is reported as disconnected once.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gateway_types::{ErrorCounters, LinkStatus, TelemetryRecord};
use log::{debug, info, warn};

use super::framer::TelemetryFramer;
use super::link::{PortOpener, PortReader, RoverWriter};

const READ_CHUNK: usize = 256;
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Output of the serial worker
#[derive(Debug, Clone, PartialEq)]
pub enum RoverEvent {
    Telemetry(TelemetryRecord),
    Link(LinkStatus),
}

pub struct SerialWorker<O: PortOpener> {
    opener: O,
    writer: RoverWriter,
    events: flume::Sender<RoverEvent>,
    shutdown: Arc<AtomicBool>,
    backoff: Duration,
    errors: Arc<ErrorCounters>,
    last_status: Option<LinkStatus>,
}

impl<O: PortOpener> SerialWorker<O> {
    pub fn new(
        opener: O,
        writer: RoverWriter,
        events: flume::Sender<RoverEvent>,
        shutdown: Arc<AtomicBool>,
        backoff: Duration,
        errors: Arc<ErrorCounters>,
    ) -> Self {
        Self {
            opener,
            writer,
            events,
            shutdown,
            backoff,
            errors,
            last_status: None,
        }
    }

    /// Run on a named thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("rover-serial".to_string())
            .spawn(move || self.run())
    }

    /// Read loop. Returns once the shutdown flag is set or the event
    /// receiver is gone.
    pub fn run(mut self) {
        let mut framer = TelemetryFramer::new();
        let mut reader: Option<PortReader> = None;
        let mut chunk = [0u8; READ_CHUNK];
        let mut first_attempt = true;

        while self.running() {
            let Some(port) = reader.as_mut() else {
                if !first_attempt && !self.sleep_backoff() {
                    break;
                }
                first_attempt = false;
                reader = self.reopen(&mut framer);
                continue;
            };

            match port.read(&mut chunk) {
                Ok(0) => {
                    warn!("Rover serial port closed ({})", self.opener.describe());
                    reader = None;
                    if !self.link_lost() {
                        break;
                    }
                }
                Ok(n) => {
                    let errors_before = framer.errors();
                    let records = framer.feed(&chunk[..n]);
                    for _ in errors_before..framer.errors() {
                        self.errors.protocol();
                    }
                    for record in records {
                        if self.events.send(RoverEvent::Telemetry(record)).is_err() {
                            self.writer.detach();
                            return;
                        }
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    warn!("Rover serial read failed: {}", e);
                    reader = None;
                    if !self.link_lost() {
                        break;
                    }
                }
            }
        }

        self.writer.detach();
        info!("Rover serial worker stopped");
    }

    fn running(&self) -> bool {
        !self.shutdown.load(Ordering::Relaxed)
    }

    fn reopen(&mut self, framer: &mut TelemetryFramer) -> Option<PortReader> {
        match self.opener.open() {
            Ok((reader, writer)) => {
                info!("Opened rover serial port {}", self.opener.describe());
                framer.reset();
                self.writer.attach(writer);
                if !self.announce(LinkStatus::Connected) {
                    self.shutdown.store(true, Ordering::Relaxed);
                }
                Some(reader)
            }
            Err(e) => {
                self.errors.transport();
                warn!("Error opening rover serial port {}: {}", self.opener.describe(), e);
                if !self.announce(LinkStatus::Disconnected) {
                    self.shutdown.store(true, Ordering::Relaxed);
                }
                None
            }
        }
    }

    /// Handle bookkeeping for a dropped link. Returns false if nobody is
    /// listening any more.
    fn link_lost(&mut self) -> bool {
        self.errors.transport();
        self.writer.detach();
        self.announce(LinkStatus::Disconnected)
    }

    /// Send `status` if it differs from the last one sent. Returns false if
    /// nobody is listening any more.
    fn announce(&mut self, status: LinkStatus) -> bool {
        if self.last_status == Some(status) {
            return true;
        }
        self.last_status = Some(status);
        self.events.send(RoverEvent::Link(status)).is_ok()
    }

    /// Sleep the backoff in small steps so shutdown stays responsive.
    fn sleep_backoff(&self) -> bool {
        debug!("Retrying rover serial port in {:?}", self.backoff);
        let mut remaining = self.backoff;
        while !remaining.is_zero() {
            if !self.running() {
                return false;
            }
            let step = remaining.min(SHUTDOWN_POLL);
            thread::sleep(step);
            remaining -= step;
        }
        self.running()
    }
}
