//! TCP transport for network-attached instruments.
//!
//! This module provides [`TcpTransport`], which implements the
//! [`Transport`] trait for instruments reachable over Ethernet: error
//! calculators with a raw command port, serial-to-LAN converters in front
//! of older devices, and small embedded HTTP servers.
//!
//! Besides the per-call receive timeout of the [`Transport`] contract, a
//! TCP transport carries a send timeout so that a peer which stops reading
//! cannot stall the writer forever.
//!
//! # Example
//!
//! ```no_run
//! use labwire_transport::TcpTransport;
//! use labwire_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> labwire_core::Result<()> {
//! let mut transport = TcpTransport::connect("192.168.1.50:14207").await?;
//! transport.write_line("AAV", "\r").await?;
//!
//! let mut buf = [0u8; 1024];
//! let n = transport.receive(&mut buf, Duration::from_secs(2)).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

use labwire_core::config::DeviceOptions;
use labwire_core::error::{Error, Result};
use labwire_core::transport::Transport;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// A connected TCP socket.
#[derive(Debug)]
pub struct TcpTransport {
    /// `None` once closed.
    stream: Option<TcpStream>,
    addr: String,
    /// Upper bound on one `send()`.
    send_timeout: Duration,
}

impl TcpTransport {
    /// Connect to a `host:port` endpoint using the default timeouts.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect to the `endpoint` in the device options.
    ///
    /// The connect attempt is bounded by the send timeout; writes use the
    /// send timeout as well. Fails with [`Error::NotReady`] if no endpoint
    /// is configured.
    pub async fn from_options(options: &DeviceOptions) -> Result<Self> {
        let addr = options.require_endpoint()?;
        let transport = Self::connect_with_timeout(addr, options.send_timeout()).await?;
        Ok(transport.with_send_timeout(options.send_timeout()))
    }

    /// Connect to a TCP endpoint with a specified connect timeout.
    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        debug!(
            addr = %addr,
            timeout_ms = timeout.as_millis(),
            "connecting to TCP endpoint"
        );

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                error!(addr = %addr, "TCP connection timed out");
                Error::Timeout
            })?
            .map_err(|e| {
                error!(addr = %addr, error = %e, "TCP connection failed");
                map_connect_error(e, addr)
            })?;

        // Commands are a few bytes each; do not let Nagle hold them back.
        if let Err(e) = stream.set_nodelay(true) {
            warn!(addr = %addr, error = %e, "could not set TCP_NODELAY");
        }

        info!(addr = %addr, "TCP connection established");

        Ok(Self {
            stream: Some(stream),
            addr: addr.to_string(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        })
    }

    /// Wrap an existing `TcpStream`, e.g. one accepted from a listener.
    pub fn from_stream(stream: TcpStream, addr: String) -> Self {
        debug!(addr = %addr, "wrapping existing TCP stream");
        Self {
            stream: Some(stream),
            addr,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Set the upper bound on one `send()`.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Give up the connected socket, e.g. to hand it to an HTTP client.
    ///
    /// Fails with [`Error::NotConnected`] after [`close`](Transport::close).
    pub fn into_stream(mut self) -> Result<TcpStream> {
        self.stream.take().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        trace!(addr = %self.addr, bytes = data.len(), data = ?data, "send");

        let write = async {
            stream.write_all(data).await?;
            stream.flush().await
        };
        match tokio::time::timeout(self.send_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(addr = %self.addr, error = %e, "TCP write failed");
                Err(map_io_error(e))
            }
            Err(_) => {
                error!(
                    addr = %self.addr,
                    timeout_ms = self.send_timeout.as_millis(),
                    "TCP write timed out"
                );
                Err(Error::Timeout)
            }
        }
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Ok(Ok(0)) => {
                debug!(addr = %self.addr, "peer closed connection");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => {
                trace!(addr = %self.addr, bytes = n, data = ?&buf[..n], "received");
                Ok(n)
            }
            Ok(Err(e)) => {
                error!(addr = %self.addr, error = %e, "TCP read failed");
                Err(map_io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                warn!(addr = %self.addr, error = %e, "TCP shutdown failed");
            }
            info!(addr = %self.addr, "TCP connection closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {addr}"))
        }
        _ => Error::Io(e),
    }
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn test_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn write_line_and_receive() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"AAV\r");
            stream.write_all(b"EPZ303V2.11\rAAVACK\r").await.unwrap();
            stream.flush().await.unwrap();
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        transport.write_line("AAV", "\r").await.unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        while !received.ends_with(b"AAVACK\r") {
            let n = transport
                .receive(&mut buf, Duration::from_secs(2))
                .await
                .unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, b"EPZ303V2.11\rAAVACK\r");

        transport.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        match TcpTransport::connect(&addr).await {
            Err(Error::Transport(msg)) => assert!(msg.contains("connection refused")),
            other => panic!("expected Transport error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn into_stream_hands_over_the_socket() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"GET");
        });

        let transport = TcpTransport::connect(&addr).await.unwrap();
        let mut stream = transport.into_stream().unwrap();
        stream.write_all(b"GET").await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn from_options_requires_endpoint() {
        let result = TcpTransport::from_options(&DeviceOptions::default()).await;
        assert!(matches!(result, Err(Error::NotReady(_))));
    }

    #[tokio::test]
    async fn from_options_applies_send_timeout() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let _conn = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let options = DeviceOptions {
            endpoint: Some(addr),
            send_timeout_ms: 250,
            ..DeviceOptions::default()
        };
        let transport = TcpTransport::from_options(&options).await.unwrap();
        assert_eq!(transport.send_timeout, Duration::from_millis(250));
        server.abort();
    }

    #[tokio::test]
    async fn receive_timeout() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        let mut buf = [0u8; 64];
        let result = transport
            .receive(&mut buf, Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(Error::Timeout)));

        transport.close().await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn peer_close_is_connection_lost() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        server.await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut buf = [0u8; 64];
        let result = transport.receive(&mut buf, Duration::from_secs(2)).await;
        assert!(
            matches!(result, Err(Error::ConnectionLost)),
            "expected ConnectionLost, got: {result:?}"
        );
    }

    #[tokio::test]
    async fn close_is_idempotent_and_disconnects() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        assert!(transport.is_connected());
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());

        assert!(matches!(transport.send(b"AAV\r").await, Err(Error::NotConnected)));
        let mut buf = [0u8; 8];
        assert!(matches!(
            transport.receive(&mut buf, Duration::from_millis(10)).await,
            Err(Error::NotConnected)
        ));
        server.abort();
    }
}
