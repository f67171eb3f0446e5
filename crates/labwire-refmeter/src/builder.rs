//! RefMeterBuilder -- fluent builder for constructing [`RefMeter`] instances.
//!
//! # Example
//!
//! ```no_run
//! use labwire_refmeter::RefMeterBuilder;
//! use labwire_core::ReferenceMeter;
//! use std::time::Duration;
//!
//! # async fn example() -> labwire_core::Result<()> {
//! let meter = RefMeterBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .read_timeout(Duration::from_secs(2))
//!     .build()
//!     .await?;
//! println!("{}", meter.version().await?);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use labwire_core::config::DeviceOptions;
use labwire_core::error::{Error, Result};
use labwire_core::transport::Transport;
use labwire_text_io::IoConfig;

use crate::meter::RefMeter;

/// Fluent builder for [`RefMeter`].
pub struct RefMeterBuilder {
    serial_port: Option<String>,
    baud_rate: u32,
    io: IoConfig,
}

impl RefMeterBuilder {
    /// A builder with 9600 baud, `\r` line endings and a one second reply
    /// timeout.
    pub fn new() -> Self {
        RefMeterBuilder {
            serial_port: None,
            baud_rate: 9600,
            io: IoConfig::default(),
        }
    }

    /// Take port, baud rate and reply timeout from device options.
    pub fn from_options(options: &DeviceOptions) -> Self {
        RefMeterBuilder {
            serial_port: options.device_path.clone(),
            baud_rate: options.baud_rate,
            io: IoConfig::from_options(options),
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

    /// Reply timeout for every request (default: 1s).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.io.read_timeout = timeout;
        self
    }

    /// Whether a late reply to a timed-out request is dropped (default: on).
    pub fn discard_orphans(mut self, enabled: bool) -> Self {
        self.io.discard_orphans = enabled;
        self
    }

    /// Build a [`RefMeter`] with a caller-provided transport.
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> RefMeter {
        RefMeter::from_transport(transport, self.io)
    }

    /// Build a [`RefMeter`] using a serial transport.
    ///
    /// Fails with [`Error::NotReady`] if no serial port was configured.
    pub async fn build(self) -> Result<RefMeter> {
        let port = self
            .serial_port
            .as_deref()
            .ok_or_else(|| Error::NotReady("devicePath is not configured".into()))?;
        let transport = labwire_transport::SerialTransport::open(port, self.baud_rate).await?;
        Ok(self.build_with_transport(Box::new(transport)))
    }
}

impl Default for RefMeterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labwire_core::{MeasurementMode, ReferenceMeter};
    use labwire_test_harness::MockTransport;

    #[tokio::test]
    async fn build_requires_serial_port() {
        let result = RefMeterBuilder::new().build().await;
        assert!(matches!(result, Err(Error::NotReady(_))));
    }

    #[test]
    fn from_options_copies_settings() {
        let options = DeviceOptions {
            device_path: Some("COM4".into()),
            baud_rate: 115_200,
            read_timeout_ms: 3000,
            ..DeviceOptions::default()
        };
        let builder = RefMeterBuilder::from_options(&options);
        assert_eq!(builder.serial_port.as_deref(), Some("COM4"));
        assert_eq!(builder.baud_rate, 115_200);
        assert_eq!(builder.io.read_timeout, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn fluent_chain_builds_working_meter() {
        let mut mock = MockTransport::new();
        mock.expect(b"MI\r", b"MI2LW;2LB;2LS;\r");
        let meter = RefMeterBuilder::new()
            .serial_port("/dev/ttyUSB0")
            .baud_rate(19_200)
            .read_timeout(Duration::from_millis(500))
            .discard_orphans(false)
            .build_with_transport(Box::new(mock));

        let modes = meter.supported_measurement_modes().await.unwrap();
        assert_eq!(
            modes,
            vec![
                MeasurementMode::TwoWireActivePower,
                MeasurementMode::TwoWireReactivePower,
                MeasurementMode::TwoWireApparentPower,
            ]
        );
    }
}
