//! Commands received from operator sessions and sent to the rover

use serde::{Deserialize, Serialize};

/// Inbound operator command, `{"event": <name>, "data": {...}}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OperatorCommand {
    /// Differential drive speeds for the left and right tracks
    Control {
        #[serde(rename = "L")]
        left: f64,
        #[serde(rename = "R")]
        right: f64,
    },
    /// Normalized joystick axes in [-1, 1]
    JoystickCommand {
        #[serde(default)]
        yaw: f64,
        #[serde(default)]
        pitch: f64,
    },
    /// Arm/disarm; recording follows the armed state
    SetArmState {
        #[serde(default)]
        state: bool,
    },
}

impl OperatorCommand {
    pub fn event_type_name(&self) -> &'static str {
        match self {
            OperatorCommand::Control { .. } => "control",
            OperatorCommand::JoystickCommand { .. } => "joystick_command",
            OperatorCommand::SetArmState { .. } => "set_arm_state",
        }
    }
}

/// Telemetry push control value for [`RoverCommand::StreamControl`]
pub const ROVER_STREAM_ON: u8 = 1;
pub const ROVER_STREAM_OFF: u8 = 0;

/// Newline-terminated JSON commands understood by the rover controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RoverCommand {
    /// `{"T":1,"L":..,"R":..}`
    Drive {
        #[serde(rename = "T")]
        kind: u16,
        #[serde(rename = "L")]
        left: f64,
        #[serde(rename = "R")]
        right: f64,
    },
    /// `{"T":131,"cmd":1|0}`
    StreamControl {
        #[serde(rename = "T")]
        kind: u16,
        cmd: u8,
    },
}

impl RoverCommand {
    pub const DRIVE: u16 = 1;
    pub const STREAM_CONTROL: u16 = 131;

    pub fn drive(left: f64, right: f64) -> Self {
        RoverCommand::Drive {
            kind: Self::DRIVE,
            left,
            right,
        }
    }

    pub fn stream(enabled: bool) -> Self {
        RoverCommand::StreamControl {
            kind: Self::STREAM_CONTROL,
            cmd: if enabled { ROVER_STREAM_ON } else { ROVER_STREAM_OFF },
        }
    }

    /// Serialize as one JSON line, newline included.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
