//! Barcode reader adapter.
//!
//! Serial barcode scanners never answer commands; they write one line per
//! scan. The reader runs a text [`Connection`] with no transactions and
//! turns every received line into a [`DeviceEvent::BarcodeScanned`].
//! Consumers attach and detach with [`BarcodeReader::subscribe`] at any
//! time; a subscriber that falls behind misses scans instead of stalling
//! the link.

use tokio::sync::broadcast;
use tracing::debug;

use labwire_core::config::DeviceOptions;
use labwire_core::error::Result;
use labwire_core::events::DeviceEvent;
use labwire_core::transport::Transport;
use labwire_text_io::{Connection, IoConfig, UnsolicitedHandler};
use labwire_transport::SerialTransport;

/// Publishes each non-blank line as a scanned code.
struct ScanHandler;

impl UnsolicitedHandler for ScanHandler {
    fn process(&self, line: &str, event_tx: &broadcast::Sender<DeviceEvent>) {
        let code = line.trim();
        if code.is_empty() {
            return;
        }
        debug!(code = %code, "barcode scanned");
        let _ = event_tx.send(DeviceEvent::BarcodeScanned {
            code: code.to_string(),
        });
    }
}

/// A barcode scanner on a line-oriented link.
pub struct BarcodeReader {
    connection: Connection,
}

impl BarcodeReader {
    /// Start reading scans from `transport`.
    pub fn spawn(transport: Box<dyn Transport>) -> Self {
        let connection =
            Connection::spawn_with_handler(transport, IoConfig::default(), Box::new(ScanHandler));
        BarcodeReader { connection }
    }

    /// Open the serial port named in `options` and start reading.
    pub async fn open(options: &DeviceOptions) -> Result<Self> {
        let transport = SerialTransport::from_options(options).await?;
        Ok(Self::spawn(Box::new(transport)))
    }

    /// Receive every scan from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.connection.subscribe()
    }

    /// Stop reading and return the closed transport.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        self.connection.shutdown().await
    }
}
