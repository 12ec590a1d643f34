//! TCP link to the gimbal
//!
//! The socket is split once at connect time. The read half goes to a
//! [`GimbalReceiver`] owned by the receive worker. The write half lives inside
//! [`GimbalLink`] behind a single async mutex together with the
//! [`GimbalSession`], so sequence allocation and the socket write happen in one
//! critical section: concurrent senders can neither reuse nor skip a sequence
//! number, and frames leave in sequence order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use gateway_types::{AttitudeSample, ErrorCounters};
use log::{debug, info, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::decoder::FrameDecoder;
use super::frame::GimbalCommand;
use crate::error::{CommandError, TransportError};

const READ_CHUNK: usize = 1024;

/// Per-connection protocol state
#[derive(Debug, Clone, Default)]
pub struct GimbalSession {
    /// Last sequence number handed out; the first frame carries `last_seq + 1`
    last_seq: u16,
    /// Locally tracked recording state. Never read back from the device.
    recording: bool,
}

impl GimbalSession {
    /// Session whose next sequenced frame will carry `next`
    pub fn starting_at(next: u16) -> Self {
        Self {
            last_seq: next.wrapping_sub(1),
            recording: false,
        }
    }

    fn next_seq(&mut self) -> u16 {
        self.last_seq = self.last_seq.wrapping_add(1);
        self.last_seq
    }
}

struct LinkInner {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    session: GimbalSession,
}

impl LinkInner {
    async fn write_command(&mut self, cmd: GimbalCommand) -> Result<(), CommandError> {
        let seq = if cmd.is_sequenced() {
            self.session.next_seq()
        } else {
            0
        };
        let bytes = cmd.encode(seq);
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        trace!("gimbal <- {:?} seq={} ({} bytes)", cmd, seq, bytes.len());
        Ok(())
    }

    /// Send the toggle and flip the tracked flag. The flag flips even when
    /// the write fails: the device state is never read back.
    async fn toggle(&mut self) -> Result<(), CommandError> {
        let result = self.write_command(GimbalCommand::ToggleRecording).await;
        self.session.recording = !self.session.recording;
        info!(
            "Camera recording {}",
            if self.session.recording { "STARTED" } else { "STOPPED" }
        );
        result
    }
}

/// Serialized write path to the gimbal
pub struct GimbalLink {
    inner: Mutex<LinkInner>,
}

impl GimbalLink {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_session(writer, GimbalSession::default())
    }

    pub fn with_session<W>(writer: W, session: GimbalSession) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Mutex::new(LinkInner {
                writer: Box::new(writer),
                session,
            }),
        }
    }

    /// Connect to the gimbal and split the socket.
    pub async fn connect(
        addr: &str,
        timeout: Duration,
    ) -> Result<(GimbalLink, OwnedReadHalf), TransportError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout(addr.to_string()))??;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        info!("Connected to gimbal at {}", addr);
        Ok((GimbalLink::new(write_half), read_half))
    }

    /// Encode and send one command.
    pub async fn send(&self, cmd: GimbalCommand) -> Result<(), CommandError> {
        self.inner.lock().await.write_command(cmd).await
    }

    pub async fn send_heartbeat(&self) -> Result<(), CommandError> {
        self.send(GimbalCommand::Heartbeat).await
    }

    /// Yaw/pitch rates, clamped to [-100, 100]
    pub async fn set_speed(&self, yaw: i32, pitch: i32) -> Result<(), CommandError> {
        self.send(GimbalCommand::speed(yaw, pitch)).await
    }

    pub async fn request_attitude_stream(&self, divisor: u8) -> Result<(), CommandError> {
        self.send(GimbalCommand::RequestAttitudeStream { divisor }).await?;
        debug!("Requested gimbal attitude stream (divisor {})", divisor);
        Ok(())
    }

    /// Unconditionally toggle recording.
    pub async fn toggle_recording(&self) -> Result<(), CommandError> {
        self.inner.lock().await.toggle().await
    }

    /// Toggle only if `desired` differs from the tracked flag.
    ///
    /// Check and toggle run under the write lock. Returns whether a toggle
    /// frame was sent.
    pub async fn set_recording(&self, desired: bool) -> Result<bool, CommandError> {
        let mut inner = self.inner.lock().await;
        if inner.session.recording == desired {
            return Ok(false);
        }
        inner.toggle().await.map(|_| true)
    }

    pub async fn is_recording(&self) -> bool {
        self.inner.lock().await.session.recording
    }
}

/// Read side of the gimbal link: turns the byte stream into attitude samples.
pub struct GimbalReceiver<R> {
    reader: R,
    decoder: FrameDecoder,
    pending: VecDeque<AttitudeSample>,
    errors: Arc<ErrorCounters>,
}

impl<R: AsyncRead + Unpin> GimbalReceiver<R> {
    pub fn new(reader: R, errors: Arc<ErrorCounters>) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            errors,
        }
    }

    /// Next attitude sample. `Ok(None)` when the gimbal closed the socket.
    ///
    /// Frames with other command ids are consumed and dropped.
    pub async fn next_attitude(&mut self) -> Result<Option<AttitudeSample>, TransportError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(sample) = self.pending.pop_front() {
                return Ok(Some(sample));
            }

            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }

            let discarded_before = self.decoder.discarded();
            for frame in self.decoder.feed(&chunk[..n]) {
                if !frame.checksum_ok() {
                    self.errors.checksum_mismatch();
                    debug!(
                        "gimbal frame seq={} cmd={:#04x} checksum mismatch ({:#06x} != {:#06x})",
                        frame.seq, frame.cmd_id, frame.checksum, frame.computed_checksum
                    );
                }
                match frame.attitude() {
                    Some(sample) => self.pending.push_back(sample),
                    None => trace!("gimbal -> cmd {:#04x} dropped", frame.cmd_id),
                }
            }
            self.errors
                .resync_bytes(self.decoder.discarded() - discarded_before);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gimbal::decoder::FrameDecoder;
    use crate::gimbal::frame::{
        encode_frame, Frame, CMD_ATTITUDE, CMD_CAMERA_FUNCTION, CMD_GIMBAL_SPEED, CTRL_DEFAULT,
        HEARTBEAT_FRAME,
    };
    use std::collections::HashSet;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    async fn read_frames<R: AsyncRead + Unpin>(mut reader: R) -> Vec<Frame> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await.unwrap();
        FrameDecoder::new().feed(&bytes)
    }

    #[tokio::test]
    async fn test_concurrent_sequence_numbers() {
        const N: u16 = 64;
        let (client, server) = duplex(64 * 1024);
        let start = 65_500u16;
        let link = Arc::new(GimbalLink::with_session(client, GimbalSession::starting_at(start)));

        let mut tasks = Vec::new();
        for i in 0..N {
            let link = link.clone();
            tasks.push(tokio::spawn(async move {
                link.set_speed(i as i32 % 100, -(i as i32 % 100)).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        drop(link);

        let frames = read_frames(server).await;
        assert_eq!(frames.len(), N as usize);
        assert!(frames.iter().all(|f| f.cmd_id == CMD_GIMBAL_SPEED && f.checksum_ok()));

        let seqs: Vec<u16> = frames.iter().map(|f| f.seq).collect();
        let expected: Vec<u16> = (0..N).map(|i| start.wrapping_add(i)).collect();
        // One lock guards allocation and write, so wire order is sequence order
        assert_eq!(seqs, expected);
        assert_eq!(seqs.iter().collect::<HashSet<_>>().len(), N as usize);
    }

    #[tokio::test]
    async fn test_heartbeat_does_not_consume_sequence() {
        let (client, mut server) = duplex(4096);
        let link = GimbalLink::new(client);
        link.send_heartbeat().await.unwrap();
        link.set_speed(0, 0).await.unwrap();
        drop(link);

        let mut bytes = Vec::new();
        server.read_to_end(&mut bytes).await.unwrap();
        assert_eq!(&bytes[..HEARTBEAT_FRAME.len()], &HEARTBEAT_FRAME);
        let frames = FrameDecoder::new().feed(&bytes[HEARTBEAT_FRAME.len()..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].seq, 1);
    }

    #[tokio::test]
    async fn test_set_recording_is_edge_triggered() {
        let (client, server) = duplex(4096);
        let link = GimbalLink::new(client);

        assert!(link.set_recording(true).await.unwrap());
        assert!(!link.set_recording(true).await.unwrap());
        assert!(link.is_recording().await);
        assert!(link.set_recording(false).await.unwrap());
        assert!(!link.is_recording().await);
        drop(link);

        let toggles = read_frames(server)
            .await
            .into_iter()
            .filter(|f| f.cmd_id == CMD_CAMERA_FUNCTION)
            .count();
        assert_eq!(toggles, 2);
    }

    #[tokio::test]
    async fn test_toggle_flips_flag_even_when_write_fails() {
        let (client, server) = duplex(64);
        drop(server);
        let link = GimbalLink::new(client);

        assert!(link.toggle_recording().await.is_err());
        assert!(link.is_recording().await);
    }

    #[tokio::test]
    async fn test_receiver_yields_attitude_and_skips_other_frames() {
        let (mut gimbal, local) = duplex(4096);
        let errors = Arc::new(ErrorCounters::new());
        let mut receiver = GimbalReceiver::new(local, errors.clone());

        let mut payload = Vec::new();
        for v in [100i16, -50, 200] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let mut stream = vec![0xDE, 0xAD];
        stream.extend_from_slice(&encode_frame(CTRL_DEFAULT, 1, 0x0A, &[1, 2, 3]));
        stream.extend_from_slice(&encode_frame(CTRL_DEFAULT, 2, CMD_ATTITUDE, &payload));
        gimbal.write_all(&stream).await.unwrap();
        drop(gimbal);

        let sample = receiver.next_attitude().await.unwrap().unwrap();
        assert_eq!(sample, AttitudeSample { yaw: 10.0, pitch: -5.0, roll: 20.0 });
        assert!(receiver.next_attitude().await.unwrap().is_none());
        assert_eq!(errors.snapshot().resync_bytes, 2);
        assert_eq!(errors.snapshot().checksum_mismatch, 0);
    }
}
