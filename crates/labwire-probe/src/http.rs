//! HTTP version probe.
//!
//! Some instruments publish their identity over a small HTTP service
//! instead of the command port. The probe issues one
//! `GET <endpoint>/Version/0` and expects a JSON document:
//!
//! ```json
//! { "ModelName": "EPZ303", "Version": "2.11" }
//! ```
//!
//! Only plain `http://` endpoints are supported. The socket is opened with
//! [`TcpTransport`] and handed to a hyper HTTP/1.1 client connection for a
//! single request.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Limited};
use hyper::client::conn::http1;
use hyper::{Request, Uri, header};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tracing::debug;

use labwire_core::config::DeviceOptions;
use labwire_core::error::{Error, Result};
use labwire_core::types::DeviceVersion;
use labwire_transport::TcpTransport;

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest response body accepted from the version endpoint.
const MAX_RESPONSE_LEN: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VersionDocument {
    model_name: String,
    version: String,
}

/// Queries `GET <endpoint>/Version/0`.
#[derive(Debug, Clone)]
pub struct HttpVersionProbe {
    endpoint: Option<String>,
    timeout: Duration,
}

impl HttpVersionProbe {
    /// Probe the service at `endpoint` (e.g. `http://10.0.0.7:8080`).
    pub fn new(endpoint: impl Into<String>) -> Self {
        HttpVersionProbe {
            endpoint: Some(endpoint.into()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Take the endpoint and receive timeout from device options.
    ///
    /// A missing endpoint is not an error here; it surfaces as
    /// [`Error::NotReady`] on the first query.
    pub fn from_options(options: &DeviceOptions) -> Self {
        HttpVersionProbe {
            endpoint: options.endpoint.clone(),
            timeout: options.recv_timeout(),
        }
    }

    /// Bound the connect and the whole exchange.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Fetch model name and version.
    pub async fn get_version(&self) -> Result<DeviceVersion> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| Error::NotReady("no HTTP endpoint configured".into()))?;
        let target = Endpoint::parse(endpoint)?;

        debug!(endpoint = %endpoint, "requesting version document");
        let body = tokio::time::timeout(self.timeout, self.fetch(&target))
            .await
            .map_err(|_| Error::Timeout)??;

        let doc: VersionDocument = serde_json::from_slice(&body)
            .map_err(|e| Error::Protocol(format!("invalid version document: {e}")))?;
        Ok(DeviceVersion::new(doc.model_name, doc.version))
    }

    async fn fetch(&self, target: &Endpoint) -> Result<Bytes> {
        let stream = TcpTransport::connect_with_timeout(&target.authority, self.timeout)
            .await?
            .into_stream()?;

        let (mut sender, connection) = http1::Builder::new()
            .title_case_headers(true)
            .handshake::<_, Empty<Bytes>>(TokioIo::new(stream))
            .await
            .map_err(|e| Error::Transport(format!("HTTP handshake with {} failed: {e}", target.authority)))?;

        let request = Request::get(target.version_path())
            .header(header::HOST, target.authority.as_str())
            .header(header::ACCEPT, "application/json")
            .header(header::CONNECTION, "close")
            .body(Empty::new())
            .map_err(|e| Error::InvalidParameter(format!("bad version request: {e}")))?;

        let exchange = async {
            let response = sender
                .send_request(request)
                .await
                .map_err(|e| Error::Protocol(format!("HTTP request failed: {e}")))?;
            let status = response.status();
            debug!(authority = %target.authority, status = %status, "version response");
            if !status.is_success() {
                return Err(Error::Protocol(format!(
                    "HTTP status {} from {}",
                    status.as_u16(),
                    target.authority
                )));
            }
            let body = Limited::new(response.into_body(), MAX_RESPONSE_LEN)
                .collect()
                .await
                .map_err(|e| Error::Protocol(format!("failed to read version document: {e}")))?;
            Ok(body.to_bytes())
        };

        // The connection future drives the socket; it finishes once the
        // server closes after the response.
        tokio::pin!(connection);
        tokio::select! {
            result = exchange => result,
            Err(e) = &mut connection => {
                Err(Error::Protocol(format!("HTTP connection to {} failed: {e}", target.authority)))
            }
        }
    }
}

/// An `http://host[:port][/prefix]` endpoint.
#[derive(Debug, PartialEq)]
struct Endpoint {
    /// `host:port` to connect to; port 80 when omitted.
    authority: String,
    /// Path prefix without trailing slash, possibly empty.
    prefix: String,
}

impl Endpoint {
    fn parse(endpoint: &str) -> Result<Self> {
        let endpoint = endpoint.trim();
        let absolute = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("http://{endpoint}")
        };
        let uri: Uri = absolute
            .parse()
            .map_err(|e| Error::InvalidParameter(format!("invalid endpoint {endpoint:?}: {e}")))?;

        match uri.scheme_str() {
            Some("http") => {}
            Some("https") => {
                return Err(Error::Unsupported(format!(
                    "TLS endpoints are not supported: {endpoint}"
                )));
            }
            other => {
                return Err(Error::Unsupported(format!(
                    "unsupported scheme {other:?} in {endpoint}"
                )));
            }
        }

        let authority = uri
            .authority()
            .filter(|a| !a.host().is_empty())
            .ok_or_else(|| Error::InvalidParameter(format!("no host in endpoint {endpoint:?}")))?;

        Ok(Endpoint {
            authority: format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80)),
            prefix: uri.path().trim_end_matches('/').to_string(),
        })
    }

    fn version_path(&self) -> String {
        format!("{}/Version/0", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labwire_test_harness::MockTcpServer;

    const VERSION_JSON: &str = r#"{"ModelName":"EPZ303","Version":"2.11"}"#;
    const HEADER_END: &[u8] = b"\r\n\r\n";

    fn ok_response(body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()
    }

    async fn serve(response: &[u8]) -> MockTcpServer {
        let mut server = MockTcpServer::new().await.unwrap();
        server.respond_after(HEADER_END, response);
        server.start();
        server
    }

    #[test]
    fn endpoint_parsing() {
        let target = Endpoint::parse("http://10.0.0.7").unwrap();
        assert_eq!(target.authority, "10.0.0.7:80");
        assert_eq!(target.prefix, "");
        assert_eq!(target.version_path(), "/Version/0");

        let target = Endpoint::parse("10.0.0.7:8080/api/").unwrap();
        assert_eq!(target.authority, "10.0.0.7:8080");
        assert_eq!(target.version_path(), "/api/Version/0");

        assert!(matches!(
            Endpoint::parse("https://meter.local"),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            Endpoint::parse("http:///Version"),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn version_from_json_document() {
        let server = serve(&ok_response(VERSION_JSON)).await;

        let probe = HttpVersionProbe::new(format!("http://{}", server.addr()));
        let version = probe.get_version().await.unwrap();
        assert_eq!(version, DeviceVersion::new("EPZ303", "2.11"));

        let received = server.wait().await.unwrap();
        let request = String::from_utf8(received[0].clone()).unwrap();
        assert!(request.starts_with("GET /Version/0 HTTP/1.1\r\n"));
        assert!(request.contains("Accept: application/json\r\n"));
        assert!(request.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn path_prefix_is_kept() {
        let server = serve(&ok_response(VERSION_JSON)).await;

        let probe = HttpVersionProbe::new(format!("http://{}/api/", server.addr()));
        probe.get_version().await.unwrap();

        let received = server.wait().await.unwrap();
        assert!(received[0].starts_with(b"GET /api/Version/0 HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn chunked_document() {
        let response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
            14\r\n{\"ModelName\":\"EPZ303\r\n13;x=1\r\n\",\"Version\":\"2.11\"}\r\n0\r\n\r\n";
        let server = serve(response).await;

        let probe = HttpVersionProbe::new(server.addr());
        let version = probe.get_version().await.unwrap();
        assert_eq!(version, DeviceVersion::new("EPZ303", "2.11"));
    }

    #[tokio::test]
    async fn oversized_chunk_is_protocol_error() {
        let response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
            ffffffffffffffff\r\nab\r\n0\r\n\r\n";
        let server = serve(response).await;

        let probe = HttpVersionProbe::new(server.addr());
        let result = probe.get_version().await;
        assert!(matches!(result, Err(Error::Protocol(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn body_without_length_ends_at_close() {
        let response = format!("HTTP/1.0 200 OK\r\n\r\n{VERSION_JSON}");
        let server = serve(response.as_bytes()).await;

        let probe = HttpVersionProbe::new(server.addr());
        let version = probe.get_version().await.unwrap();
        assert_eq!(version.model_name, "EPZ303");
    }

    #[tokio::test]
    async fn error_status_is_protocol() {
        let server = serve(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n").await;

        let probe = HttpVersionProbe::new(format!("http://{}", server.addr()));
        match probe.get_version().await {
            Err(Error::Protocol(msg)) => assert!(msg.contains("404")),
            other => panic!("expected Protocol, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_document_is_protocol() {
        let server = serve(&ok_response(r#"{"Model":"EPZ303"}"#)).await;

        let probe = HttpVersionProbe::new(format!("http://{}", server.addr()));
        let result = probe.get_version().await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn missing_endpoint_is_not_ready() {
        let probe = HttpVersionProbe::from_options(&DeviceOptions::default());
        assert!(probe.endpoint().is_none());
        assert!(matches!(
            probe.get_version().await,
            Err(Error::NotReady(_))
        ));
    }

    #[test]
    fn from_options_uses_receive_timeout() {
        let options = DeviceOptions {
            endpoint: Some("http://10.0.0.7".into()),
            recv_timeout_ms: 2500,
            ..DeviceOptions::default()
        };
        let probe = HttpVersionProbe::from_options(&options);
        assert_eq!(probe.endpoint(), Some("http://10.0.0.7"));
        assert_eq!(probe.timeout, Duration::from_millis(2500));
    }
}
