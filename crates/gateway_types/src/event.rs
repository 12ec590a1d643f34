//! Event types published by the device workers
//!
//! Every event that reaches an operator session is a [`GatewayEvent`]. On the
//! wire it is a JSON object `{"event": <name>, "data": {...}}` so the browser
//! side can dispatch on the event name.

use serde::{Deserialize, Serialize};

/// Rover pack voltage considered empty.
pub const BATTERY_EMPTY_VOLTS: f64 = 10.5;
/// Voltage span between empty and full (12.6 V is full).
pub const BATTERY_SPAN_VOLTS: f64 = 2.1;

/// Gimbal attitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttitudeSample {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

impl AttitudeSample {
    /// Build a sample from the gimbal's decidegree integers.
    pub fn from_decidegrees(yaw: i16, pitch: i16, roll: i16) -> Self {
        Self {
            pitch: f64::from(pitch) / 10.0,
            roll: f64::from(roll) / 10.0,
            yaw: f64::from(yaw) / 10.0,
        }
    }
}

/// IMU and battery telemetry reported by the rover's motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub roll: f64,
    pub pitch: f64,
    pub voltage: f64,
    pub battery_percent: f64,
}

impl TelemetryRecord {
    pub fn new(roll: f64, pitch: f64, voltage: f64) -> Self {
        Self {
            roll,
            pitch,
            voltage,
            battery_percent: battery_percent(voltage),
        }
    }
}

/// Linear map of pack voltage onto 0-100 %, clamped at both ends.
pub fn battery_percent(voltage: f64) -> f64 {
    (((voltage - BATTERY_EMPTY_VOLTS) / BATTERY_SPAN_VOLTS) * 100.0).clamp(0.0, 100.0)
}

/// Host health sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemSample {
    /// CPU temperature in degrees Celsius, 0.0 when unavailable
    pub cpu_temp: f64,
}

/// Coarse state of the rover serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialStatus {
    pub status: LinkStatus,
}

/// Events fanned out to every connected operator session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Attitude report from the gimbal
    GimbalAttitude(AttitudeSample),
    /// IMU + battery telemetry from the rover
    ImuData(TelemetryRecord),
    /// Periodic host sample
    SystemData(SystemSample),
    /// Rover serial link came up or went down
    SerialStatus(SerialStatus),
}

impl GatewayEvent {
    /// The event name as seen by operator sessions
    pub fn event_type_name(&self) -> &'static str {
        match self {
            GatewayEvent::GimbalAttitude(_) => "gimbal_attitude",
            GatewayEvent::ImuData(_) => "imu_data",
            GatewayEvent::SystemData(_) => "system_data",
            GatewayEvent::SerialStatus(_) => "serial_status",
        }
    }

    pub fn serial_status(status: LinkStatus) -> Self {
        GatewayEvent::SerialStatus(SerialStatus { status })
    }
}
