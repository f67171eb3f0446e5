//! SourceBuilder -- fluent builder for constructing [`SourceDevice`] instances.
//!
//! # Example
//!
//! ```no_run
//! use labwire_source::SourceBuilder;
//! use labwire_core::{Loadpoint, PhaseOutput, Source};
//!
//! # async fn example() -> labwire_core::Result<()> {
//! let source = SourceBuilder::new().serial_port("/dev/ttyUSB2").build().await?;
//! let loadpoint = Loadpoint {
//!     frequency: 50.0,
//!     voltages: [PhaseOutput::on(230.0, 0.0), PhaseOutput::on(230.0, 120.0), PhaseOutput::on(230.0, 240.0)],
//!     ..Loadpoint::default()
//! };
//! source.set_loadpoint(&loadpoint).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use labwire_core::config::DeviceOptions;
use labwire_core::error::{Error, Result};
use labwire_core::transport::Transport;
use labwire_text_io::IoConfig;

use crate::source::SourceDevice;

/// Fluent builder for [`SourceDevice`].
pub struct SourceBuilder {
    serial_port: Option<String>,
    baud_rate: u32,
    io: IoConfig,
}

impl SourceBuilder {
    pub fn new() -> Self {
        SourceBuilder {
            serial_port: None,
            baud_rate: 9600,
            io: IoConfig::default(),
        }
    }

    /// Take port, baud rate and reply timeout from device options.
    pub fn from_options(options: &DeviceOptions) -> Self {
        SourceBuilder {
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
    ///
    /// Sources settle their outputs before acknowledging, so loadpoint
    /// batches may need more than the default.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.io.read_timeout = timeout;
        self
    }

    /// Build a [`SourceDevice`] with a caller-provided transport.
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> SourceDevice {
        SourceDevice::from_transport(transport, self.io)
    }

    /// Build a [`SourceDevice`] using a serial transport.
    ///
    /// Fails with [`Error::NotReady`] if no serial port was configured.
    pub async fn build(self) -> Result<SourceDevice> {
        let port = self
            .serial_port
            .as_deref()
            .ok_or_else(|| Error::NotReady("devicePath is not configured".into()))?;
        let transport = labwire_transport::SerialTransport::open(port, self.baud_rate).await?;
        Ok(self.build_with_transport(Box::new(transport)))
    }
}

impl Default for SourceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
