//! Process wiring: builds every component from a [`GatewayConfig`], starts
//! the workers and the HTTP server, and tears them down once.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use devices::{GimbalLink, GimbalReceiver, RoverWriter, SerialPortOpener, SerialWorker};
use gateway_types::ErrorCounters;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::AppState;
use crate::config::{GatewayConfig, ModeStore};
use crate::hub::Hub;
use crate::router::CommandRouter;
use crate::server;
use crate::session::SessionLifecycle;
use crate::tilt::LoggingTilt;
use crate::video::VideoPipeline;
use crate::workers;

/// Serial thread to forwarder queue depth
const ROVER_EVENT_BUFFER: usize = 256;
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Gateway {
    state: AppState,
    local_addr: SocketAddr,
    server: Option<JoinHandle<anyhow::Result<()>>>,
    server_shutdown: Option<oneshot::Sender<()>>,
    workers: Vec<JoinHandle<()>>,
    serial_shutdown: Arc<AtomicBool>,
    serial_thread: Option<thread::JoinHandle<()>>,
}

impl Gateway {
    /// Bind the endpoint, connect the devices and start every worker.
    ///
    /// Only a bind failure is fatal; unreachable devices are logged and the
    /// gateway runs without them.
    pub async fn start(config: GatewayConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.server.bind)
            .await
            .with_context(|| format!("failed to bind {}", config.server.bind))?;
        let local_addr = listener.local_addr()?;

        let errors = Arc::new(ErrorCounters::new());
        let hub = Arc::new(Hub::new());
        let modes = Arc::new(ModeStore::load(&config.mode_file));
        let mut tasks = Vec::new();

        // --- Gimbal ---
        let gimbal = if config.gimbal.enabled {
            match GimbalLink::connect(&config.gimbal.address, config.gimbal.connect_timeout()).await {
                Ok((link, read_half)) => {
                    let link = Arc::new(link);
                    tasks.push(workers::spawn_gimbal_receiver(
                        GimbalReceiver::new(read_half, errors.clone()),
                        hub.clone(),
                        errors.clone(),
                    ));
                    if let Err(e) = link
                        .request_attitude_stream(config.gimbal.attitude_stream_divisor)
                        .await
                    {
                        errors.command();
                        warn!(error = %e, "Failed to request gimbal attitude stream");
                    }
                    tasks.push(workers::spawn_heartbeat(
                        link.clone(),
                        config.gimbal.heartbeat_interval(),
                        errors.clone(),
                    ));
                    Some(link)
                }
                Err(e) => {
                    errors.transport();
                    warn!(address = %config.gimbal.address, error = %e, "Gimbal unavailable");
                    None
                }
            }
        } else {
            info!("Gimbal link disabled");
            None
        };

        // --- Rover ---
        let rover = RoverWriter::new();
        let serial_shutdown = Arc::new(AtomicBool::new(false));
        let serial_thread = if config.rover.enabled {
            let (event_tx, event_rx) = flume::bounded(ROVER_EVENT_BUFFER);
            let opener = SerialPortOpener::new(
                config.rover.port.clone(),
                config.rover.baud_rate,
                config.rover.read_timeout(),
            );
            let handle = SerialWorker::new(
                opener,
                rover.clone(),
                event_tx,
                serial_shutdown.clone(),
                config.rover.reconnect_backoff(),
                errors.clone(),
            )
            .spawn()
            .context("failed to start rover serial thread")?;
            tasks.push(workers::spawn_rover_forwarder(event_rx, hub.clone()));
            Some(handle)
        } else {
            info!("Rover serial link disabled");
            None
        };

        // --- Command path ---
        let router = Arc::new(CommandRouter::new(
            gimbal,
            rover.clone(),
            Arc::new(LoggingTilt::new()),
            modes.clone(),
            errors.clone(),
        ));
        let lifecycle = Arc::new(SessionLifecycle::new(router.clone()));

        // --- Video ---
        let video = Arc::new(VideoPipeline::new(config.video.clone()));
        if video.is_enabled() {
            if let Err(e) = video.start(modes.camera_mode()).await {
                warn!(error = %e, "Video pipeline failed to start");
            }
        }

        // --- System sampling ---
        tasks.push(workers::spawn_system_sampler(
            config.system.temp_path.clone(),
            config.system.interval(),
            hub.clone(),
        ));

        let state = AppState {
            hub,
            router,
            lifecycle,
            rover,
            video,
            errors,
            session_buffer: config.hub.session_buffer,
        };

        // --- Server ---
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let server = tokio::spawn(server::run(listener, state.clone(), shutdown_rx));

        Ok(Self {
            state,
            local_addr,
            server: Some(server),
            server_shutdown: Some(shutdown_tx),
            workers: tasks,
            serial_shutdown,
            serial_thread,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Stop devices, workers and the server. Later calls do nothing.
    pub async fn shutdown(&mut self) {
        if !self.state.router.shutdown().await {
            return;
        }

        self.state.video.stop().await;

        self.serial_shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.serial_thread.take() {
            // Exits within one serial read timeout
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => {}
                _ => warn!("Rover serial thread did not exit cleanly"),
            }
        }

        for worker in self.workers.drain(..) {
            worker.abort();
        }

        if let Some(tx) = self.server_shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut server) = self.server.take() {
            match tokio::time::timeout(SERVER_DRAIN_TIMEOUT, &mut server).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!(error = %e, "HTTP server stopped with error"),
                Ok(Err(e)) => warn!(error = %e, "HTTP server task failed"),
                Err(_) => {
                    warn!("HTTP server did not drain in time");
                    server.abort();
                }
            }
        }

        info!("Gateway stopped");
    }
}
