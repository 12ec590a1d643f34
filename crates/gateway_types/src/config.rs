//! Persisted camera mode

use serde::{Deserialize, Serialize};

/// Which camera the operator is driving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CameraMode {
    /// SIYI gimbal camera, joystick drives gimbal speed
    #[default]
    Siyi,
    /// Pi camera on a tilt servo, joystick pitch drives the servo
    Picam,
}

/// Contents of the mode file, e.g. `{"camera_mode": "siyi"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModeConfig {
    #[serde(default)]
    pub camera_mode: CameraMode,
}
