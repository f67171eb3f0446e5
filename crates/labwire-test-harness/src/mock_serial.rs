//! Scripted mock transport for deterministic testing of protocol engines.
//!
//! [`MockTransport`] implements the [`Transport`] trait with a queue of
//! canned replies. Each reply is released either when a matching command is
//! sent, on the next send of any kind, or up front as unsolicited data, and
//! can carry a simulated delay. Every command sent is recorded and stays
//! readable through a [`SentLog`] after the mock has been boxed and handed to
//! a dispatcher.
//!
//! # Example
//!
//! ```
//! use labwire_test_harness::{MockTransport, ScriptedReply};
//! use std::time::Duration;
//!
//! let mut mock = MockTransport::new();
//! // When the engine sends "AAV\r", answer with two lines.
//! mock.expect(b"AAV\r", b"MT786V06.27\rAAVACK\r");
//! // The device answers the next command, whatever it is, after 200ms.
//! mock.reply(ScriptedReply::delayed("OKMA\r", Duration::from_millis(200)));
//! let sent = mock.sent_log();
//! assert!(sent.is_empty());
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use labwire_core::error::{Error, Result};
use labwire_core::transport::Transport;

/// Bytes the mock delivers to the reader, optionally after a delay.
///
/// The delay counts from the moment the reply becomes the next one to be
/// read, so consecutive delayed replies add up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedReply {
    bytes: Vec<u8>,
    delay: Duration,
}

impl ScriptedReply {
    /// A reply delivered immediately.
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        ScriptedReply {
            bytes: bytes.as_ref().to_vec(),
            delay: Duration::ZERO,
        }
    }

    /// A reply delivered after `delay`.
    pub fn delayed(bytes: impl AsRef<[u8]>, delay: Duration) -> Self {
        ScriptedReply {
            bytes: bytes.as_ref().to_vec(),
            delay,
        }
    }

    /// A reply that never arrives; useful to script a silent device.
    pub fn silent() -> Self {
        ScriptedReply::new(b"")
    }
}

/// One scripted step, consumed by a `send()` call.
#[derive(Debug, Clone)]
enum Step {
    /// Release `reply` when exactly `request` is sent (any request if `None`).
    Reply {
        request: Option<Vec<u8>>,
        reply: ScriptedReply,
    },
    /// Fail the send of `request`.
    FailSend { request: Vec<u8> },
}

/// Released bytes waiting to be read.
#[derive(Debug)]
struct Incoming {
    bytes: Vec<u8>,
    cursor: usize,
    delay: Duration,
    ready_at: Option<Instant>,
}

/// Shared record of every command sent through a [`MockTransport`].
#[derive(Debug, Clone, Default)]
pub struct SentLog {
    inner: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl SentLog {
    fn push(&self, data: &[u8]) {
        if let Ok(mut log) = self.inner.lock() {
            log.push(data.to_vec());
        }
    }

    /// All sends so far, one element per `send()` call.
    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.inner.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// All sends decoded as text with trailing CR/LF removed.
    pub fn lines(&self) -> Vec<String> {
        self.commands()
            .iter()
            .map(|c| {
                String::from_utf8_lossy(c)
                    .trim_end_matches(['\r', '\n'])
                    .to_string()
            })
            .collect()
    }

    /// Number of sends so far.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|log| log.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing was sent yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A mock [`Transport`] for testing protocol engines without hardware.
///
/// Steps are consumed in order, one per `send()`. A step with an expected
/// request fails the send with [`Error::Protocol`] if the data differs; a
/// send with no step left succeeds and releases nothing, like a device that
/// ignores the command. Released replies are returned by `receive()` in
/// release order.
///
/// `receive()` sleeps until data is due or the timeout elapses and only
/// mutates state after the sleep, so it is safe to cancel from a
/// `tokio::select!`.
#[derive(Debug)]
pub struct MockTransport {
    steps: VecDeque<Step>,
    incoming: VecDeque<Incoming>,
    connected: bool,
    sent: SentLog,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            steps: VecDeque::new(),
            incoming: VecDeque::new(),
            connected: true,
            sent: SentLog::default(),
        }
    }

    /// Add an expected request/response pair.
    ///
    /// When `send()` is called with data matching `request`, `response`
    /// becomes readable immediately. An empty response scripts a device
    /// that stays silent.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expect_reply(request, ScriptedReply::new(response));
    }

    /// Add an expected request with a possibly delayed reply.
    pub fn expect_reply(&mut self, request: &[u8], reply: ScriptedReply) {
        self.steps.push_back(Step::Reply {
            request: Some(request.to_vec()),
            reply,
        });
    }

    /// Release `reply` on the next send, whatever its content.
    pub fn reply(&mut self, reply: ScriptedReply) {
        self.steps.push_back(Step::Reply {
            request: None,
            reply,
        });
    }

    /// Fail the send of `request` with a transport error.
    pub fn expect_send_failure(&mut self, request: &[u8]) {
        self.steps.push_back(Step::FailSend {
            request: request.to_vec(),
        });
    }

    /// Queue data the device sends on its own, without being asked.
    pub fn push_incoming(&mut self, reply: ScriptedReply) {
        self.release(reply);
    }

    /// Handle to the record of sent commands.
    ///
    /// The handle stays valid after the mock is boxed and moved into an IO
    /// task.
    pub fn sent_log(&self) -> SentLog {
        self.sent.clone()
    }

    /// Return all data that has been sent through this transport.
    ///
    /// Each element is the byte slice from one `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.sent.commands()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls will
    /// return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    fn release(&mut self, reply: ScriptedReply) {
        if reply.bytes.is_empty() {
            return;
        }
        self.incoming.push_back(Incoming {
            bytes: reply.bytes,
            cursor: 0,
            delay: reply.delay,
            ready_at: None,
        });
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        self.sent.push(data);

        match self.steps.pop_front() {
            Some(Step::Reply { request, reply }) => {
                if let Some(expected) = request {
                    if data != expected.as_slice() {
                        return Err(Error::Protocol(format!(
                            "unexpected send data: expected {:02X?}, got {:02X?}",
                            expected, data
                        )));
                    }
                }
                tracing::trace!(bytes = data.len(), "mock send");
                self.release(reply);
                Ok(())
            }
            Some(Step::FailSend { request }) => {
                if data != request.as_slice() {
                    return Err(Error::Protocol(format!(
                        "unexpected send data: expected {:02X?}, got {:02X?}",
                        request, data
                    )));
                }
                Err(Error::Transport("scripted send failure".into()))
            }
            None => Ok(()),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let deadline = Instant::now() + timeout;
        let ready_at = match self.incoming.front_mut() {
            Some(next) => {
                let delay = next.delay;
                *next.ready_at.get_or_insert_with(|| Instant::now() + delay)
            }
            None => {
                tokio::time::sleep_until(deadline).await;
                return Err(Error::Timeout);
            }
        };

        if ready_at > deadline {
            tokio::time::sleep_until(deadline).await;
            return Err(Error::Timeout);
        }
        tokio::time::sleep_until(ready_at).await;

        let Some(next) = self.incoming.front_mut() else {
            return Err(Error::Timeout);
        };
        let remaining = &next.bytes[next.cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        next.cursor += n;
        if next.cursor >= next.bytes.len() {
            self.incoming.pop_front();
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.incoming.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
