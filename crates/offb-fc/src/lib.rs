pub mod map;
pub mod mav;
pub mod state;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FcConfig {
    /// MAVLink connection string, e.g. "serial:/dev/ttyACM0:921600" or "udpin:0.0.0.0:14540".
    pub url: String,

    /// Heartbeat wait used by `doctor`
    pub heartbeat_timeout_ms: Option<u64>,
}

impl FcConfig {
    /// Device and baud when `url` names a serial port.
    pub fn serial_port(&self) -> Option<(&str, u32)> {
        let rest = self.url.strip_prefix("serial:")?;
        let (dev, baud) = rest.rsplit_once(':')?;
        Some((dev, baud.parse().ok()?))
    }
}
