//! Host health sampling

use std::path::Path;

/// Thermal zone exposed by the Raspberry Pi kernel, in millidegrees Celsius
pub const CPU_TEMP_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

/// CPU temperature in degrees Celsius, or 0.0 if it cannot be read.
pub async fn read_cpu_temp(path: &Path) -> f64 {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => parse_millidegrees(&raw).unwrap_or_else(|| {
            log::debug!("Unparseable temperature {:?} in {}", raw.trim(), path.display());
            0.0
        }),
        Err(e) => {
            log::trace!("Cannot read {}: {}", path.display(), e);
            0.0
        }
    }
}

fn parse_millidegrees(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().map(|milli| milli / 1000.0)
}
