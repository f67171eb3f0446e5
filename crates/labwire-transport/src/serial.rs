//! Serial line transport.
//!
//! Most bench instruments (sources, reference meters, ZIF controllers,
//! barcode scanners) hang off an RS-232 line or a USB virtual COM port,
//! usually at 9600 baud, 8N1, no flow control. [`SerialTransport`] wraps a
//! `tokio-serial` stream and carries no protocol knowledge.
//!
//! Instruments keep talking while nobody listens: a late reply from a
//! previous session or power-up noise may sit in the OS receive buffer.
//! By default the input buffer is cleared right after the port opens so
//! that none of it is attributed to the first request.
//!
//! # Example
//!
//! ```no_run
//! use labwire_transport::SerialTransport;
//! use labwire_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> labwire_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 9600).await?;
//! transport.write_line("AAV", "\r").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, trace, warn};

use labwire_core::config::DeviceOptions;
use labwire_core::error::{Error, Result};
use labwire_core::transport::Transport;

/// Line settings for one port.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    /// Drop whatever the OS buffered before the port was opened.
    pub discard_stale_input: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            discard_stale_input: true,
        }
    }
}

impl SerialConfig {
    /// 8N1 at the baud rate named in the device options.
    pub fn from_options(options: &DeviceOptions) -> Self {
        SerialConfig {
            baud_rate: options.baud_rate,
            ..SerialConfig::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    Eight,
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

/// An open serial port.
pub struct SerialTransport {
    /// `None` once closed.
    stream: Option<SerialStream>,
    port_name: String,
}

impl SerialTransport {
    /// Open `port` (`/dev/ttyUSB0`, `COM3`) at `baud_rate`, 8N1.
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig {
            baud_rate,
            ..SerialConfig::default()
        };
        Self::open_with_config(port, config).await
    }

    /// Open the port named by `devicePath`.
    ///
    /// Fails with [`Error::NotReady`] if no path is configured.
    pub async fn from_options(options: &DeviceOptions) -> Result<Self> {
        let path = options.require_device_path()?;
        Self::open_with_config(path, SerialConfig::from_options(options)).await
    }

    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        debug!(port = %port, config = ?config, "opening serial port");

        let stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(config.data_bits.into())
            .stop_bits(config.stop_bits.into())
            .parity(config.parity.into())
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                error!(port = %port, error = %e, "failed to open serial port");
                Error::Transport(format!("failed to open serial port {port}: {e}"))
            })?;

        if config.discard_stale_input {
            if let Ok(n @ 1..) = stream.bytes_to_read() {
                debug!(port = %port, bytes = n, "discarding stale input");
            }
            if let Err(e) = stream.clear(ClearBuffer::Input) {
                warn!(port = %port, error = %e, "could not clear input buffer");
            }
        }

        info!(port = %port, baud_rate = config.baud_rate, "serial port opened");
        Ok(SerialTransport {
            stream: Some(stream),
            port_name: port.to_string(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        trace!(port = %self.port_name, bytes = data.len(), data = ?data, "send");

        let write = async {
            stream.write_all(data).await?;
            stream.flush().await
        };
        write.await.map_err(|e| {
            error!(port = %self.port_name, error = %e, "serial write failed");
            map_io_error(e)
        })
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let n = tokio::time::timeout(timeout, stream.read(buf))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| {
                error!(port = %self.port_name, error = %e, "serial read failed");
                map_io_error(e)
            })?;
        trace!(port = %self.port_name, bytes = n, data = ?&buf[..n], "received");
        Ok(n)
    }

    /// Idempotent; pending output is flushed first.
    async fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        if let Err(e) = stream.flush().await {
            warn!(port = %self.port_name, error = %e, "flush on close failed");
        }
        info!(port = %self.port_name, "serial port closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// An unplugged USB adapter shows up as a broken pipe.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_9600_8n1_with_input_discard() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.parity, Parity::None);
        assert!(config.discard_stale_input);
    }

    #[test]
    fn config_from_options_takes_baud_rate() {
        let options = DeviceOptions {
            baud_rate: 115_200,
            ..DeviceOptions::default()
        };
        let config = SerialConfig::from_options(&options);
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.parity, Parity::None);
    }

    #[test]
    fn broken_pipe_is_connection_lost() {
        let e = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(matches!(map_io_error(e), Error::ConnectionLost));
        let e = std::io::Error::other("framing");
        assert!(matches!(map_io_error(e), Error::Io(_)));
    }

    #[tokio::test]
    async fn from_options_requires_device_path() {
        let result = SerialTransport::from_options(&DeviceOptions::default()).await;
        assert!(matches!(result, Err(Error::NotReady(_))));
    }

    #[tokio::test]
    async fn open_missing_port_is_transport_error() {
        let result = SerialTransport::open("/dev/labwire-no-such-port", 9600).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
