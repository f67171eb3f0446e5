//! Plain key/value device options.
//!
//! Every adapter is configured from the same small option set: which link
//! to open and how long to wait on it. The keys are camelCase so that
//! option files shared with other tooling deserialize unchanged.
//!
//! ```
//! use labwire_core::config::DeviceOptions;
//! use std::time::Duration;
//!
//! let opts: DeviceOptions = toml::from_str(r#"
//!     devicePath = "/dev/ttyUSB0"
//!     readTimeoutMs = 2500
//! "#).unwrap();
//! assert_eq!(opts.read_timeout(), Duration::from_millis(2500));
//! assert_eq!(opts.baud_rate, 9600);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Options for one device connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOptions {
    /// Serial device path (e.g. `/dev/ttyUSB0` or `COM3`).
    #[serde(default)]
    pub device_path: Option<String>,
    /// Serial baud rate.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Network endpoint (`host:port`, or an `http://` base URL).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Per-reply timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Network send timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Network receive timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub recv_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for DeviceOptions {
    fn default() -> Self {
        DeviceOptions {
            device_path: None,
            baud_rate: default_baud_rate(),
            endpoint: None,
            read_timeout_ms: default_timeout_ms(),
            send_timeout_ms: default_timeout_ms(),
            recv_timeout_ms: default_timeout_ms(),
        }
    }
}

impl DeviceOptions {
    /// Per-reply timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Network send timeout.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Network receive timeout.
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    /// The serial device path, or [`Error::NotReady`] if none is configured.
    pub fn require_device_path(&self) -> Result<&str> {
        self.device_path
            .as_deref()
            .ok_or_else(|| Error::NotReady("devicePath is not configured".into()))
    }

    /// The network endpoint, or [`Error::NotReady`] if none is configured.
    pub fn require_endpoint(&self) -> Result<&str> {
        self.endpoint
            .as_deref()
            .ok_or_else(|| Error::NotReady("endpoint is not configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = DeviceOptions::default();
        assert_eq!(opts.baud_rate, 9600);
        assert_eq!(opts.read_timeout(), Duration::from_secs(1));
        assert!(opts.device_path.is_none());
    }

    #[test]
    fn deserialize_camel_case_keys() {
        let opts: DeviceOptions = toml::from_str(
            r#"
            devicePath = "/dev/ttyS1"
            baudRate = 115200
            readTimeoutMs = 300
            sendTimeoutMs = 400
            recvTimeoutMs = 500
            "#,
        )
        .unwrap();
        assert_eq!(opts.require_device_path().unwrap(), "/dev/ttyS1");
        assert_eq!(opts.baud_rate, 115_200);
        assert_eq!(opts.read_timeout(), Duration::from_millis(300));
        assert_eq!(opts.send_timeout(), Duration::from_millis(400));
        assert_eq!(opts.recv_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn missing_endpoint_is_not_ready() {
        let opts = DeviceOptions::default();
        assert!(matches!(opts.require_endpoint(), Err(Error::NotReady(_))));
    }
}
