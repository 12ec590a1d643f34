//! Serial port access for the rover
//!
//! The read handle is owned by the serial worker thread. Writers share a
//! cloned handle through [`RoverWriter`], whose slot is empty whenever the
//! worker is between connections. Async callers write through
//! [`RoverWriter::send`], which runs the port I/O on the blocking pool.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use gateway_types::RoverCommand;
use serialport::{DataBits, FlowControl, Parity, StopBits};

use crate::error::{CommandError, TransportError};

pub type PortReader = Box<dyn Read + Send>;
pub type PortWriter = Box<dyn Write + Send>;

/// Opens the rover port. The serial worker calls this on start and after
/// every failure.
pub trait PortOpener: Send + 'static {
    fn open(&mut self) -> Result<(PortReader, PortWriter), TransportError>;

    /// Human-readable name for logs
    fn describe(&self) -> String;
}

/// Real UART, 8N1, no flow control
pub struct SerialPortOpener {
    path: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialPortOpener {
    pub fn new(path: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            read_timeout,
        }
    }
}

impl PortOpener for SerialPortOpener {
    fn open(&mut self) -> Result<(PortReader, PortWriter), TransportError> {
        let port = serialport::new(&self.path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open()?;
        let writer = port.try_clone()?;
        Ok((Box::new(port), Box::new(writer)))
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.path, self.baud_rate)
    }
}

/// Shared write handle to the rover
#[derive(Clone, Default)]
pub struct RoverWriter {
    slot: Arc<Mutex<Option<PortWriter>>>,
    connected: Arc<AtomicBool>,
    // Keeps async sends in submission order across blocking-pool threads
    order: Arc<tokio::sync::Mutex<()>>,
}

impl RoverWriter {
    /// Writer with no port attached; every send fails until one is.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `cmd` without blocking the calling runtime thread.
    pub async fn send(&self, cmd: &RoverCommand) -> Result<(), CommandError> {
        let line = cmd.to_line()?;
        if !self.is_connected() {
            return Err(CommandError::Unavailable("rover"));
        }
        let _order = self.order.lock().await;
        let writer = self.clone();
        tokio::task::spawn_blocking(move || writer.write_line(line.as_bytes()))
            .await
            .map_err(|e| CommandError::Transport(TransportError::Io(io::Error::other(e))))?
    }

    /// Serialize `cmd` as a JSON line and write it on the current thread.
    pub fn send_blocking(&self, cmd: &RoverCommand) -> Result<(), CommandError> {
        let line = cmd.to_line()?;
        self.write_line(line.as_bytes())
    }

    /// Does not wait on an in-flight write.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn attach(&self, writer: PortWriter) {
        *self.lock() = Some(writer);
        self.connected.store(true, Ordering::Release);
    }

    pub fn detach(&self) {
        self.connected.store(false, Ordering::Release);
        self.lock().take();
    }

    fn write_line(&self, line: &[u8]) -> Result<(), CommandError> {
        let mut slot = self.lock();
        let writer = slot.as_mut().ok_or(CommandError::Unavailable("rover"))?;
        writer.write_all(line)?;
        writer.flush()?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<PortWriter>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}
