//! Shared types for the rover gateway
//!
//! This crate contains the event and command types exchanged between the device
//! workers, the broadcast hub and operator sessions, plus the persisted camera
//! mode and the absorbed-error counters.

pub mod command;
pub mod config;
pub mod event;
pub mod metrics;

// Re-export commonly used types
pub use command::*;
pub use config::*;
pub use event::*;
pub use metrics::*;
