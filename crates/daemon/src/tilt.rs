//! Camera tilt servo used in picam mode

use std::sync::Mutex;

/// Positions the camera tilt servo.
pub trait TiltActuator: Send + Sync {
    /// Requested angle in degrees, positive tilts up
    fn set_angle(&self, degrees: f64);
}

/// Records the last requested angle and logs it.
///
/// Stands in for the GPIO driver on hosts without a servo.
#[derive(Debug, Default)]
pub struct LoggingTilt {
    last: Mutex<Option<f64>>,
}

impl LoggingTilt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_angle(&self) -> Option<f64> {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TiltActuator for LoggingTilt {
    fn set_angle(&self, degrees: f64) {
        tracing::debug!(degrees, "Tilt servo angle");
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(degrees);
    }
}
