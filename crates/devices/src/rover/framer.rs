//! JSON object framer for the rover's serial stream
//!
//! The motor controller prints JSON objects with no length prefix. A `{`
//! starts (or restarts) accumulation, a `}` closes it and the buffer is parsed.
//! This is brace matching, not a tokenizer: nested objects or braces inside
//! string values break framing and the object is dropped. An object that
//! grows past [`MAX_OBJECT_LEN`] without closing is dropped as well.

use gateway_types::TelemetryRecord;
use serde_json::Value;

use crate::error::ProtocolError;

/// `T` value of the IMU/battery report
pub const TELEMETRY_KIND: f64 = 1001.0;

/// Longest object accepted, braces included
pub const MAX_OBJECT_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramerState {
    Idle,
    Accumulating,
}

#[derive(Debug)]
pub struct TelemetryFramer {
    buf: Vec<u8>,
    state: FramerState,
    errors: u64,
}

impl TelemetryFramer {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(128),
            state: FramerState::Idle,
            errors: 0,
        }
    }

    /// Feed a chunk, returning every telemetry record completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<TelemetryRecord> {
        let mut records = Vec::new();
        for &byte in chunk {
            match self.push(byte) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    self.errors += 1;
                    log::debug!("Dropping rover frame: {}", e);
                }
            }
        }
        records
    }

    /// Objects discarded so far because they failed to decode
    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Forget any partial object, e.g. after the port was reopened.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = FramerState::Idle;
    }

    fn push(&mut self, byte: u8) -> Result<Option<TelemetryRecord>, ProtocolError> {
        if !byte.is_ascii() {
            let was_accumulating = self.state == FramerState::Accumulating;
            self.reset();
            return if was_accumulating {
                Err(ProtocolError::NonAscii(byte))
            } else {
                Ok(None)
            };
        }

        if byte == b'{' {
            self.buf.clear();
            self.buf.push(byte);
            self.state = FramerState::Accumulating;
            return Ok(None);
        }

        if self.state == FramerState::Idle {
            return Ok(None);
        }

        if self.buf.len() >= MAX_OBJECT_LEN {
            self.reset();
            return Err(ProtocolError::Oversized(MAX_OBJECT_LEN));
        }

        self.buf.push(byte);
        if byte != b'}' {
            return Ok(None);
        }

        let parsed = serde_json::from_slice::<Value>(&self.buf);
        self.reset();
        Ok(telemetry_from_value(&parsed?))
    }
}

impl Default for TelemetryFramer {
    fn default() -> Self {
        Self::new()
    }
}

fn telemetry_from_value(value: &Value) -> Option<TelemetryRecord> {
    if value.get("T").and_then(Value::as_f64) != Some(TELEMETRY_KIND) {
        return None;
    }
    let field = |key: &str| value.get(key).and_then(Value::as_f64).unwrap_or(0.0);
    Some(TelemetryRecord::new(field("r"), field("p"), field("v")))
}
