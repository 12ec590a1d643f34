use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use devices::system::CPU_TEMP_PATH;
use gateway_types::{CameraMode, ModeConfig};

/// HTTP/WebSocket endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
        }
    }
}

/// SIYI gimbal TCP link
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GimbalConfig {
    pub enabled: bool,
    pub address: String,
    pub connect_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Attitude push rate divisor sent once after connect
    pub attitude_stream_divisor: u8,
}

impl Default for GimbalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "192.168.144.25:37260".to_string(),
            connect_timeout_ms: 5000,
            heartbeat_interval_ms: 2000,
            attitude_stream_divisor: 5,
        }
    }
}

/// Rover motor controller UART
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    pub enabled: bool,
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub reconnect_backoff_ms: u64,
}

impl Default for RoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: "/dev/ttyS0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 1000,
            reconnect_backoff_ms: 2000,
        }
    }
}

/// Host sampling
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub temp_path: PathBuf,
    pub interval_ms: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            temp_path: PathBuf::from(CPU_TEMP_PATH),
            interval_ms: 2000,
        }
    }
}

/// Operator session fan-out
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Per-session queue depth; events beyond it are dropped for that session
    pub session_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { session_buffer: 64 }
    }
}

/// External video pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub enabled: bool,
    pub rtsp_url: String,
    pub chunk_size: usize,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rtsp_url: "rtsp://192.168.144.25:8554/main.264".to_string(),
            chunk_size: 4096,
        }
    }
}

/// Configuration for the gateway daemon
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub gimbal: GimbalConfig,
    pub rover: RoverConfig,
    pub system: SystemConfig,
    pub hub: HubConfig,
    pub video: VideoConfig,
    /// Persisted camera mode file
    pub mode_file: PathBuf,
}

impl GatewayConfig {
    /// Load from a TOML file. Missing sections and keys take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Could not read configuration file '{}': {}", path.display(), e))?;
        let mut config: GatewayConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Could not parse configuration file '{}': {}", path.display(), e))?;
        if config.mode_file.as_os_str().is_empty() {
            config.mode_file = default_mode_file();
        }
        Ok(config)
    }

    pub fn defaults() -> Self {
        Self {
            mode_file: default_mode_file(),
            ..Self::default()
        }
    }
}

impl GimbalConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl RoverConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

impl SystemConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_mode_file() -> PathBuf {
    PathBuf::from("config.json")
}

/// Camera mode persisted as `{"camera_mode": "..."}`
///
/// Read once at startup (falling back to the default on any error) and
/// written back on every change.
pub struct ModeStore {
    path: PathBuf,
    current: RwLock<ModeConfig>,
}

impl ModeStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("Invalid mode file {}: {}; using defaults", path.display(), e);
                ModeConfig::default()
            }),
            Err(_) => ModeConfig::default(),
        };
        tracing::info!("Loaded mode config: {:?}", current);
        Self {
            path,
            current: RwLock::new(current),
        }
    }

    pub fn camera_mode(&self) -> CameraMode {
        self.current.read().unwrap_or_else(|e| e.into_inner()).camera_mode
    }

    /// Update the mode and write the file.
    pub fn set_camera_mode(&self, mode: CameraMode) -> anyhow::Result<()> {
        let snapshot = {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            current.camera_mode = mode;
            *current
        };
        std::fs::write(&self.path, serde_json::to_string(&snapshot)?)?;
        Ok(())
    }
}
