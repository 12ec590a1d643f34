//! Rover motor controller: newline-terminated JSON over a UART

pub mod framer;
pub mod link;
pub mod worker;

pub use framer::TelemetryFramer;
pub use link::{PortOpener, PortReader, PortWriter, RoverWriter, SerialPortOpener};
pub use worker::{RoverEvent, SerialWorker};
