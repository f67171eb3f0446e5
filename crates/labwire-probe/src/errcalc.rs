//! Firmware probe for networked error calculators.
//!
//! Error calculators expose a raw TCP command port that speaks the same
//! `\r`-terminated text protocol as the serial instruments. The probe
//! connects once in [`initialize`](ErrorCalculator::initialize), then runs
//! the version exchange through a text [`Connection`].

use std::time::Duration;

use tracing::info;

use labwire_core::config::DeviceOptions;
use labwire_core::dispatcher::Dispatcher;
use labwire_core::error::{Error, Result};
use labwire_core::request::TextRequest;
use labwire_core::transport::Transport;
use labwire_core::types::{DeviceVersion, ProbeResult};
use labwire_text_io::{Connection, IoConfig};
use labwire_transport::TcpTransport;

/// A networked error calculator.
///
/// Every query fails with [`Error::NotConnected`] until
/// [`initialize`](ErrorCalculator::initialize) has succeeded.
#[derive(Default)]
pub struct ErrorCalculator {
    name: Option<String>,
    connection: Option<Connection>,
}

impl ErrorCalculator {
    /// An uninitialized calculator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to `endpoint` (`host:port`).
    ///
    /// `send_timeout_ms` bounds the connect attempt and every write;
    /// `recv_timeout_ms` is the reply timeout of each request. Calling
    /// this again replaces the previous connection.
    pub async fn initialize(
        &mut self,
        name: &str,
        endpoint: &str,
        send_timeout_ms: u64,
        recv_timeout_ms: u64,
    ) -> Result<()> {
        let send_timeout = Duration::from_millis(send_timeout_ms);
        let transport = TcpTransport::connect_with_timeout(endpoint, send_timeout)
            .await?
            .with_send_timeout(send_timeout);
        let config = IoConfig {
            read_timeout: Duration::from_millis(recv_timeout_ms),
            ..IoConfig::default()
        };

        if let Some(previous) = self.connection.take() {
            let _ = previous.shutdown().await;
        }
        self.connection = Some(Connection::spawn(Box::new(transport), config));
        self.name = Some(name.to_string());
        info!(name = %name, endpoint = %endpoint, "error calculator initialized");
        Ok(())
    }

    /// [`initialize`](ErrorCalculator::initialize) from device options.
    ///
    /// Fails with [`Error::NotReady`] if no endpoint is configured.
    pub async fn initialize_from_options(&mut self, name: &str, options: &DeviceOptions) -> Result<()> {
        let endpoint = options.require_endpoint()?;
        self.initialize(
            name,
            endpoint,
            options.send_timeout_ms,
            options.recv_timeout_ms,
        )
        .await
    }

    /// The name given at initialization.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.connection.is_some()
    }

    /// Query model name and firmware version.
    pub async fn get_version(&self) -> Result<DeviceVersion> {
        let connection = self.connection.as_ref().ok_or(Error::NotConnected)?;
        let reply = connection
            .execute_one(TextRequest::sentinel("AAV", "AAVACK"))
            .await?;
        let line = reply
            .body()
            .last()
            .ok_or_else(|| Error::Protocol("AAV reply carries no version line".into()))?;
        DeviceVersion::parse(line)
    }

    /// Check whether the calculator answers; never fails.
    pub async fn probe(&self) -> ProbeResult {
        match self.get_version().await {
            Ok(version) => ProbeResult::success(version.to_string()),
            Err(e) => ProbeResult::failure(&e),
        }
    }

    /// Close the connection and return the transport, if initialized.
    pub async fn shutdown(self) -> Result<Option<Box<dyn Transport>>> {
        match self.connection {
            Some(connection) => connection.shutdown().await.map(Some),
            None => Ok(None),
        }
    }
}
