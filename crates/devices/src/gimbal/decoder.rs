//! Incremental frame decoder for the gimbal's TCP byte stream
//!
//! TCP delivers arbitrary chunks, so the decoder keeps a growing buffer and a
//! small state machine:
//!
//! - `SeekingMarker`: drop one leading byte at a time until the buffer starts
//!   with `0x55 0x66`
//! - `AccumulatingHeader`: wait for the 8 header bytes, read the declared length
//! - `AccumulatingPayload`: wait for `10 + len` bytes, slice the frame off
//!
//! The checksum is not used to reject frames. A corrupted length field makes
//! the decoder swallow whatever bytes follow until the declared length is
//! satisfied; it resynchronizes on the next marker after that.

use bytes::{Buf, BytesMut};

use super::frame::{Frame, FRAME_OVERHEAD, HEADER_LEN, MARKER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    SeekingMarker,
    AccumulatingHeader,
    AccumulatingPayload { frame_len: usize },
}

/// Chunk-fed decoder producing zero or more complete frames per call
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    state: DecodeState,
    discarded: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
            state: DecodeState::SeekingMarker,
            discarded: 0,
        }
    }

    /// Append `chunk` and return every frame that is now complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Total bytes dropped while hunting for a marker
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Bytes held waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                DecodeState::SeekingMarker => {
                    if !self.seek_marker() {
                        return None;
                    }
                    self.state = DecodeState::AccumulatingHeader;
                }
                DecodeState::AccumulatingHeader => {
                    if self.buf.len() < HEADER_LEN {
                        return None;
                    }
                    let len = u16::from_le_bytes([self.buf[3], self.buf[4]]) as usize;
                    self.state = DecodeState::AccumulatingPayload {
                        frame_len: FRAME_OVERHEAD + len,
                    };
                }
                DecodeState::AccumulatingPayload { frame_len } => {
                    if self.buf.len() < frame_len {
                        return None;
                    }
                    let raw = self.buf.split_to(frame_len).freeze();
                    self.state = DecodeState::SeekingMarker;
                    return Some(Frame::from_bytes(raw));
                }
            }
        }
    }

    /// Drop leading bytes until the buffer starts with the marker.
    /// Returns false when more data is needed to decide.
    fn seek_marker(&mut self) -> bool {
        loop {
            match self.buf.len() {
                0 => return false,
                1 => {
                    if self.buf[0] == MARKER[0] {
                        return false;
                    }
                }
                _ => {
                    if self.buf[..2] == MARKER {
                        return true;
                    }
                }
            }
            self.buf.advance(1);
            self.discarded += 1;
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
