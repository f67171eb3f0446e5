//! ZifBuilder -- fluent builder for constructing [`ZifController`] instances.
//!
//! Separates configuration from construction so that callers can set up
//! serial port parameters and timeouts before the link is opened.
//!
//! # Example
//!
//! ```no_run
//! use labwire_zif::ZifBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> labwire_core::Result<()> {
//! let zif = ZifBuilder::new()
//!     .serial_port("/dev/ttyUSB1")
//!     .read_timeout(Duration::from_millis(300))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use labwire_core::config::DeviceOptions;
use labwire_core::error::{Error, Result};
use labwire_core::transport::Transport;

use crate::io::ZifConfig;
use crate::socket::ZifController;

/// Fluent builder for [`ZifController`].
pub struct ZifBuilder {
    serial_port: Option<String>,
    baud_rate: u32,
    config: ZifConfig,
}

impl ZifBuilder {
    /// A builder with 9600 baud and a one second read timeout.
    pub fn new() -> Self {
        ZifBuilder {
            serial_port: None,
            baud_rate: 9600,
            config: ZifConfig::default(),
        }
    }

    /// Take port, baud rate and read timeout from device options.
    pub fn from_options(options: &DeviceOptions) -> Self {
        ZifBuilder {
            serial_port: options.device_path.clone(),
            baud_rate: options.baud_rate,
            config: ZifConfig::from_options(options),
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// How long each reply read may wait (default: 1s).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Build a [`ZifController`] with a caller-provided transport.
    ///
    /// This is the entry point for testing (pass a `MockTransport` from
    /// `labwire-test-harness`) and for links other than a local serial
    /// port.
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> ZifController {
        ZifController::new(transport, self.config)
    }

    /// Build a [`ZifController`] using a serial transport.
    ///
    /// Fails with [`Error::NotReady`] if no serial port was configured.
    pub async fn build(self) -> Result<ZifController> {
        let port = self
            .serial_port
            .as_deref()
            .ok_or_else(|| Error::NotReady("devicePath is not configured".into()))?;
        let transport = labwire_transport::SerialTransport::open(port, self.baud_rate).await?;
        Ok(self.build_with_transport(Box::new(transport)))
    }
}

impl Default for ZifBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labwire_core::ZifSocket;
    use labwire_test_harness::MockTransport;

    #[tokio::test]
    async fn build_requires_serial_port() {
        let result = ZifBuilder::new().build().await;
        assert!(matches!(result, Err(Error::NotReady(_))));
    }

    #[test]
    fn from_options_copies_link_settings() {
        let options = DeviceOptions {
            device_path: Some("/dev/ttyS3".into()),
            baud_rate: 19_200,
            read_timeout_ms: 400,
            ..DeviceOptions::default()
        };
        let builder = ZifBuilder::from_options(&options);
        assert_eq!(builder.serial_port.as_deref(), Some("/dev/ttyS3"));
        assert_eq!(builder.baud_rate, 19_200);
        assert_eq!(builder.config.read_timeout, Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn build_with_transport_uses_read_timeout() {
        let mut mock = MockTransport::new();
        mock.expect(&[0xC2], &[]);
        let zif = ZifBuilder::new()
            .read_timeout(Duration::from_millis(50))
            .build_with_transport(Box::new(mock));

        let started = tokio::time::Instant::now();
        assert!(matches!(zif.version().await, Err(Error::NoMoreData)));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50) && elapsed < Duration::from_millis(100));
    }
}
