// Re-export modules for library use
pub mod api;
pub mod config;
pub mod gateway;
pub mod hub;
pub mod router;
pub mod server;
pub mod session;
pub mod tilt;
pub mod video;
pub mod websocket;
pub mod workers;

pub use gateway::Gateway;
