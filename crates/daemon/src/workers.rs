//! Async transport workers
//!
//! Each worker owns one I/O resource and publishes what it reads to the hub.
//! None of them share state beyond the hub and the gimbal link.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use devices::system::read_cpu_temp;
use devices::{GimbalLink, GimbalReceiver, RoverEvent};
use gateway_types::{ErrorCounters, GatewayEvent, SystemSample};
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::hub::Hub;

/// Publish gimbal attitude until the socket closes or fails. Never reconnects.
pub fn spawn_gimbal_receiver<R>(
    mut receiver: GimbalReceiver<R>,
    hub: Arc<Hub>,
    errors: Arc<ErrorCounters>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match receiver.next_attitude().await {
                Ok(Some(sample)) => hub.publish(GatewayEvent::GimbalAttitude(sample)).await,
                Ok(None) => {
                    warn!("Gimbal closed the connection; attitude stream stopped");
                    break;
                }
                Err(e) => {
                    errors.transport();
                    warn!(error = %e, "Gimbal receive failed; attitude stream stopped");
                    break;
                }
            }
        }
    })
}

/// Send a heartbeat every `interval`; stop at the first failed send.
pub fn spawn_heartbeat(
    link: Arc<GimbalLink>,
    interval: Duration,
    errors: Arc<ErrorCounters>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = link.send_heartbeat().await {
                errors.transport();
                debug!(error = %e, "Gimbal heartbeat failed, stopping heartbeat");
                break;
            }
        }
    })
}

/// Publish a CPU temperature sample every `interval`.
pub fn spawn_system_sampler(
    temp_path: PathBuf,
    interval: Duration,
    hub: Arc<Hub>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let cpu_temp = read_cpu_temp(&temp_path).await;
            hub.publish(GatewayEvent::SystemData(SystemSample { cpu_temp }))
                .await;
        }
    })
}

/// Bridge the serial thread's events onto the hub.
pub fn spawn_rover_forwarder(events: flume::Receiver<RoverEvent>, hub: Arc<Hub>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(event) = events.recv_async().await {
            let event = match event {
                RoverEvent::Telemetry(record) => GatewayEvent::ImuData(record),
                RoverEvent::Link(status) => {
                    info!(?status, "Rover serial link");
                    GatewayEvent::serial_status(status)
                }
            };
            hub.publish(event).await;
        }
        debug!("Rover event forwarding task finished.");
    })
}
