//! Video relay
//!
//! The gateway does not touch video itself. A `gst-launch-1.0` child writes a
//! multipart MJPEG stream to stdout; the chunks are fanned out unchanged to
//! every `/video_feed` client.

use std::process::Stdio;

use bytes::Bytes;
use futures::StreamExt;
use gateway_types::CameraMode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::config::VideoConfig;

pub const GST_LAUNCH: &str = "gst-launch-1.0";
/// Multipart boundary emitted by `multipartmux`
pub const MULTIPART_BOUNDARY: &str = "--frame";
/// Chunks buffered per viewer before it starts losing data
const VIEWER_BACKLOG: usize = 256;

/// `gst-launch-1.0` arguments for `mode`
pub fn pipeline_args(mode: CameraMode, rtsp_url: &str) -> Vec<String> {
    let mut args: Vec<String> = match mode {
        CameraMode::Siyi => vec![
            "rtspsrc".into(),
            format!("location={rtsp_url}"),
            "latency=0".into(),
            "tcp-timeout=5000000".into(),
            "!".into(),
            "rtph264depay".into(),
            "!".into(),
            "h264parse".into(),
            "!".into(),
            "v4l2h264dec".into(),
            "!".into(),
            "videoscale".into(),
            "!".into(),
            "video/x-raw,width=640,height=360".into(),
            "!".into(),
            "v4l2jpegenc".into(),
        ],
        CameraMode::Picam => vec![
            "libcamerasrc".into(),
            "!".into(),
            "video/x-raw,width=640,height=360,framerate=30/1,format=NV12".into(),
            "!".into(),
            "videoconvert".into(),
            "!".into(),
            "jpegenc".into(),
        ],
    };
    args.extend(
        [
            "!",
            "multipartmux",
            "boundary=--frame",
            "!",
            "fdsink",
            "fd=1",
        ]
        .map(String::from),
    );
    args
}

struct Running {
    child: Child,
    pumps: Vec<JoinHandle<()>>,
}

pub struct VideoPipeline {
    program: String,
    config: VideoConfig,
    frames: broadcast::Sender<Bytes>,
    running: Mutex<Option<Running>>,
}

impl VideoPipeline {
    pub fn new(config: VideoConfig) -> Self {
        Self::with_program(GST_LAUNCH, config)
    }

    /// Pipeline launching `program` instead of `gst-launch-1.0`
    pub fn with_program(program: impl Into<String>, config: VideoConfig) -> Self {
        let (frames, _) = broadcast::channel(VIEWER_BACKLOG);
        Self {
            program: program.into(),
            config,
            frames,
            running: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.frames.subscribe()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Start the pipeline for `mode`, terminating any running one first.
    pub async fn start(&self, mode: CameraMode) -> std::io::Result<()> {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            terminate(previous).await;
        }

        info!(?mode, "Starting video pipeline");
        let mut child = Command::new(&self.program)
            .args(pipeline_args(mode, &self.config.rtsp_url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        info!(pid = ?child.id(), "Video pipeline started");

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let frames = self.frames.clone();
            let mut chunks = ReaderStream::with_capacity(stdout, self.config.chunk_size.max(1));
            pumps.push(tokio::spawn(async move {
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        // No viewers is fine; the stream keeps draining
                        Ok(chunk) => {
                            let _ = frames.send(chunk);
                        }
                        Err(e) => {
                            warn!(error = %e, "Video pipeline read failed");
                            break;
                        }
                    }
                }
                debug!("Video pipeline stdout closed");
            }));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[gst] {}", line.trim());
                }
            }));
        }

        *running = Some(Running { child, pumps });
        Ok(())
    }

    /// Terminate the running pipeline, if any.
    pub async fn stop(&self) {
        if let Some(previous) = self.running.lock().await.take() {
            terminate(previous).await;
        }
    }
}

async fn terminate(mut running: Running) {
    if let Err(e) = running.child.kill().await {
        debug!(error = %e, "Video pipeline already exited");
    }
    for pump in running.pumps {
        pump.abort();
    }
    info!("Video pipeline stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[test]
    fn test_siyi_pipeline_reads_rtsp() {
        let args = pipeline_args(CameraMode::Siyi, "rtsp://cam/main.264");
        assert_eq!(args[0], "rtspsrc");
        assert_eq!(args[1], "location=rtsp://cam/main.264");
        assert!(args.contains(&"video/x-raw,width=640,height=360".to_string()));
        assert_eq!(args[args.len() - 4..], ["boundary=--frame", "!", "fdsink", "fd=1"]);
    }

    #[test]
    fn test_picam_pipeline_uses_libcamera() {
        let args = pipeline_args(CameraMode::Picam, "ignored");
        assert_eq!(args[0], "libcamerasrc");
        assert!(args.contains(&"jpegenc".to_string()));
        assert!(!args.iter().any(|a| a.contains("ignored")));
    }

    #[tokio::test]
    async fn test_stdout_is_relayed() {
        // `echo` prints its arguments, standing in for the encoder output
        let pipeline = VideoPipeline::with_program("echo", VideoConfig::default());
        let mut frames = pipeline.subscribe();
        pipeline.start(CameraMode::Picam).await.unwrap();

        let mut seen = Vec::new();
        while !String::from_utf8_lossy(&seen).contains('\n') {
            let chunk = timeout(Duration::from_secs(2), frames.recv())
                .await
                .expect("chunk within timeout")
                .unwrap();
            seen.extend_from_slice(&chunk);
        }
        assert!(String::from_utf8_lossy(&seen).starts_with("libcamerasrc"));
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_start() {
        let pipeline =
            VideoPipeline::with_program("/nonexistent/gst-launch-1.0", VideoConfig::default());
        assert!(pipeline.start(CameraMode::Siyi).await.is_err());
        pipeline.stop().await;
    }
}
