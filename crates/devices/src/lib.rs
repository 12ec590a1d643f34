//! Device links for the rover gateway
//!
//! - [`gimbal`]: SIYI binary protocol codec and the TCP link to the gimbal
//! - [`rover`]: JSON-over-serial framer and the reconnecting serial worker
//! - [`system`]: host temperature sampling

pub mod error;
pub mod gimbal;
pub mod rover;
pub mod system;

// Re-export the main types that users need
pub use error::{CommandError, ProtocolError, TransportError};
pub use gimbal::{GimbalLink, GimbalReceiver};
pub use rover::{PortOpener, RoverEvent, RoverWriter, SerialPortOpener, SerialWorker};
