//! Operator session counting
//!
//! Device streaming follows the number of connected sessions: the first
//! session turns rover telemetry on, the last one leaving turns it off and
//! parks the gimbal.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

/// Device side effects of the first-connect and last-disconnect transitions
#[async_trait]
pub trait DeviceControl: Send + Sync {
    async fn start_streaming(&self);
    async fn stop_streaming(&self);
}

pub struct SessionLifecycle {
    count: Mutex<usize>,
    devices: Arc<dyn DeviceControl>,
}

impl SessionLifecycle {
    pub fn new(devices: Arc<dyn DeviceControl>) -> Self {
        Self {
            count: Mutex::new(0),
            devices,
        }
    }

    /// Count a new session, returning the new total.
    ///
    /// The 0 -> 1 side effect runs while the count is locked, so a racing
    /// disconnect cannot interleave its stop with this start.
    pub async fn connect(&self) -> usize {
        let mut count = self.count.lock().await;
        *count += 1;
        if *count == 1 {
            info!("First operator connected, enabling rover telemetry");
            self.devices.start_streaming().await;
        }
        *count
    }

    /// Count a session leaving, returning the new total. Extra calls at zero
    /// are ignored.
    pub async fn disconnect(&self) -> usize {
        let mut count = self.count.lock().await;
        if *count == 0 {
            return 0;
        }
        *count -= 1;
        if *count == 0 {
            info!("Last operator disconnected, stopping devices");
            self.devices.stop_streaming().await;
        }
        *count
    }

    pub async fn active(&self) -> usize {
        *self.count.lock().await
    }
}
