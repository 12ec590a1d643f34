//! Operator command routing
//!
//! Every inbound session command goes through [`CommandRouter::handle`].
//! Failures are logged and counted here and never reach the session.
//!
//! Device writes run under a read guard of the command gate; shutdown takes
//! the write guard, so no command can land after the stop commands.

use std::sync::Arc;

use async_trait::async_trait;
use devices::{CommandError, GimbalLink, RoverWriter};
use gateway_types::{CameraMode, ErrorCounters, OperatorCommand, RoverCommand};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::ModeStore;
use crate::session::DeviceControl;
use crate::tilt::TiltActuator;

/// Joystick axis in [-1, 1] to gimbal speed units
const JOYSTICK_SPEED_SCALE: f64 = 100.0;
/// Joystick pitch in [-1, 1] to tilt servo degrees
const JOYSTICK_TILT_SCALE: f64 = 90.0;

pub struct CommandRouter {
    gimbal: Option<Arc<GimbalLink>>,
    rover: RoverWriter,
    tilt: Arc<dyn TiltActuator>,
    modes: Arc<ModeStore>,
    /// `true` once shut down
    gate: RwLock<bool>,
    errors: Arc<ErrorCounters>,
}

impl CommandRouter {
    pub fn new(
        gimbal: Option<Arc<GimbalLink>>,
        rover: RoverWriter,
        tilt: Arc<dyn TiltActuator>,
        modes: Arc<ModeStore>,
        errors: Arc<ErrorCounters>,
    ) -> Self {
        Self {
            gimbal,
            rover,
            tilt,
            modes,
            gate: RwLock::new(false),
            errors,
        }
    }

    /// Dispatch and absorb any failure.
    pub async fn handle(&self, cmd: OperatorCommand) {
        let name = cmd.event_type_name();
        match self.dispatch(cmd).await {
            Ok(()) => {}
            Err(CommandError::ShuttingDown) => {
                debug!(command = name, "Gateway shutting down, command ignored");
            }
            Err(CommandError::Unavailable(device)) => {
                self.errors.command();
                debug!(command = name, device, "Device unavailable, command dropped");
            }
            Err(e) => {
                self.errors.command();
                warn!(command = name, error = %e, "Command failed");
            }
        }
    }

    /// Translate one operator command into device writes.
    pub async fn dispatch(&self, cmd: OperatorCommand) -> Result<(), CommandError> {
        let closed = self.gate.read().await;
        if *closed {
            return Err(CommandError::ShuttingDown);
        }

        match cmd {
            OperatorCommand::Control { left, right } => {
                self.rover.send(&RoverCommand::drive(left, right)).await
            }
            OperatorCommand::JoystickCommand { yaw, pitch } => match self.modes.camera_mode() {
                CameraMode::Siyi => {
                    let yaw = (yaw * JOYSTICK_SPEED_SCALE) as i32;
                    let pitch = (pitch * JOYSTICK_SPEED_SCALE) as i32;
                    self.gimbal()?.set_speed(yaw, pitch).await
                }
                CameraMode::Picam => {
                    self.tilt.set_angle(pitch * JOYSTICK_TILT_SCALE);
                    Ok(())
                }
            },
            OperatorCommand::SetArmState { state } => {
                if self.gimbal()?.set_recording(state).await? {
                    debug!(armed = state, "Recording toggled");
                }
                Ok(())
            }
        }
    }

    /// Close the command gate and stop the devices. Only the first call
    /// does anything; returns whether this call ran the shutdown.
    pub async fn shutdown(&self) -> bool {
        // Waits for in-flight dispatches to finish
        let mut closed = self.gate.write().await;
        if *closed {
            return false;
        }
        *closed = true;
        info!("Closing command gate and stopping devices");
        self.stop_devices().await;
        true
    }

    pub async fn is_closed(&self) -> bool {
        *self.gate.read().await
    }

    pub fn modes(&self) -> &Arc<ModeStore> {
        &self.modes
    }

    fn gimbal(&self) -> Result<&GimbalLink, CommandError> {
        self.gimbal
            .as_deref()
            .ok_or(CommandError::Unavailable("gimbal"))
    }

    async fn stop_devices(&self) {
        if let Err(e) = self.rover.send(&RoverCommand::stream(false)).await {
            self.errors.command();
            debug!(error = %e, "Could not disable rover telemetry");
        }
        if let Some(gimbal) = &self.gimbal {
            if let Err(e) = gimbal.set_speed(0, 0).await {
                self.errors.command();
                warn!(error = %e, "Could not stop gimbal");
            }
        }
    }
}

#[async_trait]
impl DeviceControl for CommandRouter {
    async fn start_streaming(&self) {
        let closed = self.gate.read().await;
        if *closed {
            return;
        }
        if let Err(e) = self.rover.send(&RoverCommand::stream(true)).await {
            self.errors.command();
            debug!(error = %e, "Could not enable rover telemetry");
        }
    }

    async fn stop_streaming(&self) {
        let closed = self.gate.read().await;
        if *closed {
            return;
        }
        self.stop_devices().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tilt::LoggingTilt;
    use std::io::Write;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::time::{timeout, Duration};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// UART that takes its time with every write
    struct SlowSink(SharedSink);

    impl Write for SlowSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            std::thread::sleep(Duration::from_millis(300));
            self.0.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        router: CommandRouter,
        gimbal_rx: DuplexStream,
        rover: SharedSink,
        tilt: Arc<LoggingTilt>,
        errors: Arc<ErrorCounters>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let rover = SharedSink::default();
        fixture_with_port(rover.clone(), Box::new(rover))
    }

    fn fixture_with_port(rover: SharedSink, port: devices::rover::PortWriter) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let modes = Arc::new(ModeStore::load(dir.path().join("config.json")));
        let (gimbal_tx, gimbal_rx) = tokio::io::duplex(1024);
        let writer = RoverWriter::new();
        writer.attach(port);
        let tilt = Arc::new(LoggingTilt::new());
        let errors = Arc::new(ErrorCounters::new());
        let router = CommandRouter::new(
            Some(Arc::new(GimbalLink::new(gimbal_tx))),
            writer,
            tilt.clone(),
            modes,
            errors.clone(),
        );
        Fixture {
            router,
            gimbal_rx,
            rover,
            tilt,
            errors,
            _dir: dir,
        }
    }

    async fn read_frame(rx: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        timeout(Duration::from_secs(1), rx.read_exact(&mut buf))
            .await
            .expect("gimbal frame within timeout")
            .unwrap();
        buf
    }

    async fn assert_no_gimbal_bytes(rx: &mut DuplexStream) {
        let mut buf = [0u8; 1];
        assert!(timeout(Duration::from_millis(50), rx.read(&mut buf)).await.is_err());
    }

    #[tokio::test]
    async fn test_control_goes_to_rover() {
        let f = fixture();
        f.router
            .dispatch(OperatorCommand::Control { left: 0.5, right: -0.25 })
            .await
            .unwrap();
        assert_eq!(f.rover.contents(), "{\"T\":1,\"L\":0.5,\"R\":-0.25}\n");
    }

    #[tokio::test]
    async fn test_joystick_drives_gimbal_in_siyi_mode() {
        let mut f = fixture();
        f.router
            .dispatch(OperatorCommand::JoystickCommand { yaw: 0.505, pitch: -1.0 })
            .await
            .unwrap();

        let frame = read_frame(&mut f.gimbal_rx, 12).await;
        assert_eq!(&frame[..8], &[0x55, 0x66, 0x00, 0x02, 0x00, 0x01, 0x00, 0x07]);
        assert_eq!(frame[8] as i8, 50);
        assert_eq!(frame[9] as i8, -100);
        assert_eq!(f.tilt.last_angle(), None);
    }

    #[tokio::test]
    async fn test_joystick_tilts_in_picam_mode() {
        let mut f = fixture();
        f.router.modes().set_camera_mode(CameraMode::Picam).unwrap();
        f.router
            .dispatch(OperatorCommand::JoystickCommand { yaw: 1.0, pitch: 0.5 })
            .await
            .unwrap();

        assert_eq!(f.tilt.last_angle(), Some(45.0));
        assert_no_gimbal_bytes(&mut f.gimbal_rx).await;
    }

    #[tokio::test]
    async fn test_arm_state_is_edge_triggered() {
        let mut f = fixture();
        let arm = OperatorCommand::SetArmState { state: true };
        f.router.dispatch(arm.clone()).await.unwrap();
        f.router.dispatch(arm).await.unwrap();

        let toggle = read_frame(&mut f.gimbal_rx, 11).await;
        assert_eq!(
            toggle,
            [0x55, 0x66, 0x00, 0x01, 0x00, 0x01, 0x00, 0x0c, 0x02, 0xa3, 0x20]
        );
        assert_no_gimbal_bytes(&mut f.gimbal_rx).await;

        f.router
            .dispatch(OperatorCommand::SetArmState { state: false })
            .await
            .unwrap();
        let toggle = read_frame(&mut f.gimbal_rx, 11).await;
        assert_eq!(toggle[5], 0x02);
        assert_eq!(toggle[7], 0x0c);
    }

    #[tokio::test]
    async fn test_shutdown_runs_once_and_gates_commands() {
        let mut f = fixture();
        assert!(!f.router.is_closed().await);
        assert!(f.router.shutdown().await);
        assert!(!f.router.shutdown().await);
        assert!(f.router.is_closed().await);

        assert_eq!(f.rover.contents(), "{\"T\":131,\"cmd\":0}\n");
        let stop = read_frame(&mut f.gimbal_rx, 12).await;
        assert_eq!(
            stop,
            [0x55, 0x66, 0x00, 0x02, 0x00, 0x01, 0x00, 0x07, 0x00, 0x00, 0x73, 0xc9]
        );
        assert_no_gimbal_bytes(&mut f.gimbal_rx).await;

        let result = f
            .router
            .dispatch(OperatorCommand::Control { left: 1.0, right: 1.0 })
            .await;
        assert!(matches!(result, Err(CommandError::ShuttingDown)));

        f.router.stop_streaming().await;
        assert_eq!(f.rover.contents(), "{\"T\":131,\"cmd\":0}\n");
        assert_eq!(f.errors.snapshot().command, 0);
    }

    #[tokio::test]
    async fn test_missing_devices_are_counted_not_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let errors = Arc::new(ErrorCounters::new());
        let router = CommandRouter::new(
            None,
            RoverWriter::new(),
            Arc::new(LoggingTilt::new()),
            Arc::new(ModeStore::load(dir.path().join("config.json"))),
            errors.clone(),
        );

        router
            .handle(OperatorCommand::Control { left: 0.1, right: 0.1 })
            .await;
        router
            .handle(OperatorCommand::SetArmState { state: true })
            .await;
        router.start_streaming().await;

        assert_eq!(errors.snapshot().command, 3);
    }

    #[tokio::test]
    async fn test_slow_rover_write_does_not_stall_runtime() {
        let rover = SharedSink::default();
        let f = fixture_with_port(rover.clone(), Box::new(SlowSink(rover.clone())));
        let router = Arc::new(f.router);

        let drive = {
            let router = router.clone();
            tokio::spawn(async move {
                router
                    .handle(OperatorCommand::Control { left: 1.0, right: 1.0 })
                    .await
            })
        };

        // Same current-thread runtime as the write
        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(started.elapsed() < Duration::from_millis(100));

        drive.await.unwrap();
        assert_eq!(rover.contents(), "{\"T\":1,\"L\":1.0,\"R\":1.0}\n");
        assert_eq!(f.errors.snapshot().command, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_gimbal_command_lands_after_stop() {
        let f = fixture();
        let Fixture {
            router,
            mut gimbal_rx,
            _dir,
            ..
        } = f;
        let router = Arc::new(router);

        let mut joysticks = Vec::new();
        for _ in 0..16 {
            let router = router.clone();
            joysticks.push(tokio::spawn(async move {
                router
                    .dispatch(OperatorCommand::JoystickCommand { yaw: 1.0, pitch: 1.0 })
                    .await
            }));
        }
        let stopper = {
            let router = router.clone();
            tokio::spawn(async move { router.shutdown().await })
        };
        for joystick in joysticks {
            let result = joystick.await.unwrap();
            assert!(matches!(result, Ok(()) | Err(CommandError::ShuttingDown)));
        }
        assert!(stopper.await.unwrap());
        drop(router);

        let mut bytes = Vec::new();
        timeout(Duration::from_secs(1), gimbal_rx.read_to_end(&mut bytes))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bytes.len() % 12, 0);
        let frames: Vec<&[u8]> = bytes.chunks(12).collect();
        let last = frames.last().unwrap();
        assert_eq!(&last[8..10], &[0, 0]);
        assert_eq!(
            frames.iter().filter(|frame| frame[8..10] == [0, 0]).count(),
            1
        );
    }
}
