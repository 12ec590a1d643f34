//! SIYI frame layout, outbound commands and decoded frames
//!
//! ```text
//! | 0x55 0x66 | ctrl | len (u16 LE) | seq (u16 LE) | cmd | payload (len) | crc (u16 LE) |
//! ```
//!
//! Header is 8 bytes, so a frame is always `10 + len` bytes long.

use bytes::{BufMut, Bytes, BytesMut};
use gateway_types::AttitudeSample;

use super::crc::crc16;

/// Start-of-frame marker
pub const MARKER: [u8; 2] = [0x55, 0x66];
/// Bytes before the payload: marker(2) + ctrl(1) + len(2) + seq(2) + cmd(1)
pub const HEADER_LEN: usize = 8;
/// Trailing checksum
pub const CRC_LEN: usize = 2;
/// Header + checksum, i.e. the size of an empty frame
pub const FRAME_OVERHEAD: usize = HEADER_LEN + CRC_LEN;

pub const CTRL_DEFAULT: u8 = 0x00;

// Command ids
pub const CMD_HEARTBEAT: u8 = 0x01;
pub const CMD_GIMBAL_SPEED: u8 = 0x07;
pub const CMD_CAMERA_FUNCTION: u8 = 0x0C;
pub const CMD_ATTITUDE: u8 = 0x0D;
pub const CMD_REQUEST_STREAM: u8 = 0x25;

/// Camera function payload: toggle video recording
pub const CAMERA_TOGGLE_RECORD: u8 = 0x02;
/// Stream type for [`GimbalCommand::RequestAttitudeStream`]
pub const STREAM_TYPE_ATTITUDE: u8 = 1;

/// Heartbeat is a fixed literal and never carries a fresh sequence number.
pub const HEARTBEAT_FRAME: [u8; 11] = [
    0x55, 0x66, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x59, 0x8B,
];

/// Gimbal speed limit, both axes
pub const MAX_SPEED: i8 = 100;

/// Outbound gimbal command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GimbalCommand {
    Heartbeat,
    /// Yaw and pitch rates in [-100, 100]
    SetGimbalSpeed { yaw: i8, pitch: i8 },
    ToggleRecording,
    /// Ask the gimbal to push attitude reports; `divisor` sets the push rate
    RequestAttitudeStream { divisor: u8 },
}

impl GimbalCommand {
    /// Clamp both axes into the range the gimbal accepts.
    pub fn speed(yaw: i32, pitch: i32) -> Self {
        let clamp = |v: i32| v.clamp(-(MAX_SPEED as i32), MAX_SPEED as i32) as i8;
        GimbalCommand::SetGimbalSpeed {
            yaw: clamp(yaw),
            pitch: clamp(pitch),
        }
    }

    pub fn cmd_id(&self) -> u8 {
        match self {
            GimbalCommand::Heartbeat => CMD_HEARTBEAT,
            GimbalCommand::SetGimbalSpeed { .. } => CMD_GIMBAL_SPEED,
            GimbalCommand::ToggleRecording => CMD_CAMERA_FUNCTION,
            GimbalCommand::RequestAttitudeStream { .. } => CMD_REQUEST_STREAM,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match *self {
            GimbalCommand::Heartbeat => Vec::new(),
            GimbalCommand::SetGimbalSpeed { yaw, pitch } => {
                vec![yaw.to_le_bytes()[0], pitch.to_le_bytes()[0]]
            }
            GimbalCommand::ToggleRecording => vec![CAMERA_TOGGLE_RECORD],
            GimbalCommand::RequestAttitudeStream { divisor } => {
                vec![STREAM_TYPE_ATTITUDE, divisor]
            }
        }
    }

    /// Whether this command consumes a sequence number.
    pub fn is_sequenced(&self) -> bool {
        !matches!(self, GimbalCommand::Heartbeat)
    }

    /// Wire bytes for this command. The heartbeat ignores `seq`.
    pub fn encode(&self, seq: u16) -> Bytes {
        match self {
            GimbalCommand::Heartbeat => Bytes::from_static(&HEARTBEAT_FRAME),
            _ => encode_frame(CTRL_DEFAULT, seq, self.cmd_id(), &self.payload()),
        }
    }
}

/// Build a complete frame, checksum included.
pub fn encode_frame(ctrl: u8, seq: u16, cmd_id: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_OVERHEAD + payload.len());
    buf.put_slice(&MARKER);
    buf.put_u8(ctrl);
    buf.put_u16_le(payload.len() as u16);
    buf.put_u16_le(seq);
    buf.put_u8(cmd_id);
    buf.put_slice(payload);
    let crc = crc16(&buf);
    buf.put_u16_le(crc);
    buf.freeze()
}

/// One complete inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub ctrl: u8,
    pub seq: u16,
    pub cmd_id: u8,
    pub payload: Bytes,
    /// Checksum as received; never used to reject the frame
    pub checksum: u16,
    /// Checksum recomputed over the received header and payload
    pub computed_checksum: u16,
}

impl Frame {
    /// Split a buffer holding exactly one frame (`10 + len` bytes).
    pub(crate) fn from_bytes(raw: Bytes) -> Frame {
        let len = u16::from_le_bytes([raw[3], raw[4]]) as usize;
        let body_end = HEADER_LEN + len;
        Frame {
            ctrl: raw[2],
            seq: u16::from_le_bytes([raw[5], raw[6]]),
            cmd_id: raw[7],
            payload: raw.slice(HEADER_LEN..body_end),
            checksum: u16::from_le_bytes([raw[body_end], raw[body_end + 1]]),
            computed_checksum: crc16(&raw[..body_end]),
        }
    }

    pub fn checksum_ok(&self) -> bool {
        self.checksum == self.computed_checksum
    }

    /// Attitude report (cmd 0x0D, at least 6 payload bytes), otherwise `None`.
    pub fn attitude(&self) -> Option<AttitudeSample> {
        if self.cmd_id != CMD_ATTITUDE || self.payload.len() < 6 {
            return None;
        }
        let p = &self.payload;
        let yaw = i16::from_le_bytes([p[0], p[1]]);
        let pitch = i16::from_le_bytes([p[2], p[3]]);
        let roll = i16::from_le_bytes([p[4], p[5]]);
        Some(AttitudeSample::from_decidegrees(yaw, pitch, roll))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checksum_field(frame: &[u8]) -> u16 {
        let n = frame.len();
        u16::from_le_bytes([frame[n - 2], frame[n - 1]])
    }

    #[test]
    fn test_encode_matches_known_frames() {
        assert_eq!(
            GimbalCommand::speed(0, 0).encode(1).as_ref(),
            &[0x55, 0x66, 0x00, 0x02, 0x00, 0x01, 0x00, 0x07, 0x00, 0x00, 0x73, 0xC9]
        );
        assert_eq!(
            GimbalCommand::ToggleRecording.encode(1).as_ref(),
            &[0x55, 0x66, 0x00, 0x01, 0x00, 0x01, 0x00, 0x0C, 0x02, 0xA3, 0x20]
        );
        assert_eq!(
            GimbalCommand::RequestAttitudeStream { divisor: 5 }.encode(1).as_ref(),
            &[0x55, 0x66, 0x00, 0x02, 0x00, 0x01, 0x00, 0x25, 0x01, 0x05, 0x41, 0x42]
        );
        assert_eq!(
            GimbalCommand::speed(50, -100).encode(7).as_ref(),
            &[0x55, 0x66, 0x00, 0x02, 0x00, 0x07, 0x00, 0x07, 0x32, 0x9C, 0x34, 0x25]
        );
    }

    #[test]
    fn test_checksum_field_matches_frame_body() {
        let commands = [
            GimbalCommand::speed(12, -34),
            GimbalCommand::ToggleRecording,
            GimbalCommand::RequestAttitudeStream { divisor: 2 },
        ];
        for (seq, cmd) in [0u16, 1, 255, 256, 65535].iter().zip(commands.iter().cycle()) {
            let bytes = cmd.encode(*seq);
            let body = &bytes[..bytes.len() - CRC_LEN];
            assert_eq!(crc16(body), checksum_field(&bytes), "{cmd:?} seq {seq}");
        }

        let odd = encode_frame(CTRL_DEFAULT, 42, 0x99, &[0xFF; 37]);
        assert_eq!(odd.len(), FRAME_OVERHEAD + 37);
        assert_eq!(crc16(&odd[..odd.len() - 2]), checksum_field(&odd));
    }

    #[test]
    fn test_heartbeat_is_literal() {
        assert_eq!(GimbalCommand::Heartbeat.encode(1234).as_ref(), &HEARTBEAT_FRAME);
        assert!(!GimbalCommand::Heartbeat.is_sequenced());
        assert_eq!(crc16(&HEARTBEAT_FRAME[..9]), checksum_field(&HEARTBEAT_FRAME));
    }

    #[test]
    fn test_speed_clamped() {
        assert_eq!(
            GimbalCommand::speed(250, -180),
            GimbalCommand::SetGimbalSpeed { yaw: 100, pitch: -100 }
        );
    }

    #[test]
    fn test_attitude_decode() {
        let mut payload = Vec::new();
        for v in [100i16, -50, 200] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let frame = Frame::from_bytes(encode_frame(CTRL_DEFAULT, 3, CMD_ATTITUDE, &payload));
        assert!(frame.checksum_ok());
        assert_eq!(
            frame.attitude(),
            Some(AttitudeSample { yaw: 10.0, pitch: -5.0, roll: 20.0 })
        );

        let short = Frame::from_bytes(encode_frame(CTRL_DEFAULT, 3, CMD_ATTITUDE, &payload[..4]));
        assert_eq!(short.attitude(), None);
    }
}
