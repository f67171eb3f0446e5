//! Mock TCP server for protocol-level testing.
//!
//! [`MockTcpServer`] provides a lightweight TCP listener pre-loaded with
//! scripted responses, enabling deterministic testing of network adapters
//! (error calculators, HTTP version endpoints) without real hardware.
//!
//! # Example
//!
//! ```
//! use labwire_test_harness::MockTcpServer;
//!
//! # async fn example() -> labwire_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//!
//! // When the client sends "AAV\r", respond with the version lines.
//! server.expect(b"AAV\r", b"EPZ303V2.11\rAAVACK\r");
//! server.start();
//!
//! // Get the address to connect a TcpTransport to
//! let addr = server.addr().to_string();
//! // ... connect and test ...
//! # Ok(())
//! # }
//! ```

use labwire_core::error::{Error, Result};
use std::collections::VecDeque;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How the server recognises the end of one client request.
#[derive(Debug, Clone)]
enum RequestMatch {
    /// The client must send exactly these bytes.
    Exact(Vec<u8>),
    /// Read until this delimiter, whatever comes before it.
    UntilDelimiter(Vec<u8>),
}

/// A pre-loaded request/response pair for the mock TCP server.
#[derive(Debug, Clone)]
struct TcpExpectation {
    request: RequestMatch,
    response: Vec<u8>,
}

/// A mock TCP server for testing adapters over the network.
///
/// The server listens on a random available port on localhost. Once
/// [`start`](MockTcpServer::start) is called, it accepts a single
/// connection and processes expectations in order: for each expected
/// request, it reads from the client and writes back the corresponding
/// response. When the script is exhausted the connection is closed.
///
/// If the client sends data that does not match the next expectation,
/// the server stops and [`wait`](MockTcpServer::wait) reports the mismatch.
pub struct MockTcpServer {
    addr: String,
    listener: Option<TcpListener>,
    expectations: VecDeque<TcpExpectation>,
    server_handle: Option<JoinHandle<std::result::Result<Vec<Vec<u8>>, String>>>,
}

impl MockTcpServer {
    /// Create a new mock TCP server listening on a random port.
    ///
    /// The listener is bound immediately, so clients may connect before
    /// [`start`](MockTcpServer::start); they are accepted once it runs.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {e}")))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();

        Ok(Self {
            addr,
            listener: Some(listener),
            expectations: VecDeque::new(),
            server_handle: None,
        })
    }

    /// Add an expected request/response pair.
    ///
    /// When the connected client sends bytes matching `request`, the server
    /// replies with `response`.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(TcpExpectation {
            request: RequestMatch::Exact(request.to_vec()),
            response: response.to_vec(),
        });
    }

    /// Reply with `response` once the client has sent `delimiter`.
    ///
    /// Use this for requests whose exact bytes are not known up front, such
    /// as an HTTP request ending in a blank line.
    pub fn respond_after(&mut self, delimiter: &[u8], response: &[u8]) {
        self.expectations.push_back(TcpExpectation {
            request: RequestMatch::UntilDelimiter(delimiter.to_vec()),
            response: response.to_vec(),
        });
    }

    /// Get the address the server is listening on.
    ///
    /// Use this to connect a `TcpTransport` to the mock server.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Start the server, accepting a single client connection and processing
    /// all expectations.
    ///
    /// This spawns a background task. Call [`wait`](MockTcpServer::wait) to
    /// block until all expectations have been processed and check for errors.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let expectations: Vec<TcpExpectation> = self.expectations.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {e}"))?;

            let mut received = Vec::with_capacity(expectations.len());
            for (i, expectation) in expectations.iter().enumerate() {
                let request = read_request(&mut stream, &expectation.request)
                    .await
                    .map_err(|e| format!("expectation {i}: {e}"))?;

                stream
                    .write_all(&expectation.response)
                    .await
                    .map_err(|e| format!("expectation {i}: write error: {e}"))?;
                stream
                    .flush()
                    .await
                    .map_err(|e| format!("expectation {i}: flush error: {e}"))?;
                received.push(request);
            }

            Ok(received)
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the server task to complete and return the requests it
    /// received, one element per expectation.
    ///
    /// Call this after the client has finished its interactions to verify
    /// that all expectations were met.
    pub async fn wait(self) -> std::result::Result<Vec<Vec<u8>>, String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {e}"))?,
            None => Ok(Vec::new()),
        }
    }
}

async fn read_request(
    stream: &mut TcpStream,
    request: &RequestMatch,
) -> std::result::Result<Vec<u8>, String> {
    match request {
        RequestMatch::Exact(expected) => {
            let mut buf = vec![0u8; expected.len()];
            let mut total_read = 0;
            while total_read < expected.len() {
                let n = stream
                    .read(&mut buf[total_read..])
                    .await
                    .map_err(|e| format!("read error: {e}"))?;
                if n == 0 {
                    return Err(format!(
                        "client disconnected after {total_read} bytes (expected {})",
                        expected.len()
                    ));
                }
                total_read += n;
            }
            if &buf != expected {
                return Err(format!(
                    "request mismatch: expected {expected:02X?}, got {buf:02X?}"
                ));
            }
            Ok(buf)
        }
        RequestMatch::UntilDelimiter(delimiter) => {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 512];
            while !buf.windows(delimiter.len()).any(|w| w == delimiter.as_slice()) {
                let n = stream
                    .read(&mut chunk)
                    .await
                    .map_err(|e| format!("read error: {e}"))?;
                if n == 0 {
                    return Err(format!(
                        "client disconnected after {} bytes without delimiter",
                        buf.len()
                    ));
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            Ok(buf)
        }
    }
}
