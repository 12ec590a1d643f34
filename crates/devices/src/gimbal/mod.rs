//! SIYI gimbal protocol over TCP
//!
//! [`frame`] defines the wire layout and outbound commands, [`decoder`] recovers
//! frames from the stream, [`link`] owns the socket halves.

pub mod crc;
pub mod decoder;
pub mod frame;
pub mod link;

pub use crc::crc16;
pub use decoder::FrameDecoder;
pub use frame::{Frame, GimbalCommand};
pub use link::{GimbalLink, GimbalReceiver, GimbalSession};
