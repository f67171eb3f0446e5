//! The transaction dispatcher for line-oriented instruments.
//!
//! One tokio task owns the transport exclusively. It writes submitted
//! commands in submission order, reads the link continuously, splits the
//! stream into lines and hands every line to the [`ReplyMatcher`], which
//! resolves pending transactions strictly first-in first-out. Callers talk
//! to the task through [`Connection`], which implements
//! [`Dispatcher`](labwire_core::Dispatcher).
//!
//! The command channel is the only way into the task, so the pending queue
//! has a single owner and needs no lock: submissions and read-loop
//! resolutions are serialised by the task itself.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, trace, warn};

use labwire_core::config::DeviceOptions;
use labwire_core::dispatcher::Dispatcher;
use labwire_core::error::{Error, Result};
use labwire_core::events::DeviceEvent;
use labwire_core::request::{PendingReply, Reply, TextRequest};
use labwire_core::transport::Transport;

use crate::protocol::{Feed, LineBuffer, ReplyMatcher};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Configuration for the dispatcher IO task.
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// Reply timeout for requests without their own override.
    pub read_timeout: Duration,
    /// Line terminator appended to every command.
    pub newline: String,
    /// Drop the late reply of a timed-out request instead of letting it
    /// reach the next transaction.
    pub discard_orphans: bool,
    /// Upper bound on one idle read, so the loop notices commands promptly.
    pub poll_interval: Duration,
}

impl Default for IoConfig {
    fn default() -> Self {
        IoConfig {
            read_timeout: Duration::from_secs(1),
            newline: "\r".into(),
            discard_orphans: true,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl IoConfig {
    /// Derive the dispatcher settings from plain device options.
    pub fn from_options(options: &DeviceOptions) -> Self {
        IoConfig {
            read_timeout: options.read_timeout(),
            ..IoConfig::default()
        }
    }
}

/// The completion side of one pending transaction.
type Slot = oneshot::Sender<Result<Reply>>;

/// A message sent from [`Connection`] to the IO task.
enum Command {
    /// Write each request and queue it for reply matching.
    Submit { batch: Vec<(TextRequest, Slot)> },
    /// Graceful shutdown; returns the transport for recovery.
    Shutdown {
        reply: oneshot::Sender<Box<dyn Transport>>,
    },
}

/// Callback for lines that arrive while no transaction is pending.
///
/// The IO task calls [`UnsolicitedHandler::process`] for every such line.
/// Adapters for devices that talk on their own (barcode readers, meters
/// with push output) implement it to publish richer events.
pub trait UnsolicitedHandler: Send + Sync + 'static {
    fn process(&self, line: &str, event_tx: &broadcast::Sender<DeviceEvent>);
}

/// Publishes every unsolicited line as [`DeviceEvent::Unsolicited`].
pub struct PublishUnsolicited;

impl UnsolicitedHandler for PublishUnsolicited {
    fn process(&self, line: &str, event_tx: &broadcast::Sender<DeviceEvent>) {
        let _ = event_tx.send(DeviceEvent::Unsolicited {
            line: line.to_string(),
        });
    }
}

/// Handle to a running dispatcher.
///
/// Dropping the handle cancels the IO task; pending transactions then
/// resolve with [`Error::Closed`]. Use [`shutdown`](Connection::shutdown) to
/// get the transport back.
pub struct Connection {
    cmd_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<DeviceEvent>,
    task: JoinHandle<()>,
    _cancel: DropGuard,
}

impl Connection {
    /// Spawn the IO task over `transport`.
    pub fn spawn(transport: Box<dyn Transport>, config: IoConfig) -> Self {
        Self::spawn_with_handler(transport, config, Box::new(PublishUnsolicited))
    }

    /// Spawn the IO task with a custom handler for unsolicited lines.
    pub fn spawn_with_handler(
        transport: Box<dyn Transport>,
        config: IoConfig,
        handler: Box<dyn UnsolicitedHandler>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(32);
        let (event_tx, _) = broadcast::channel(256);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(io_loop(
            transport,
            config,
            event_tx.clone(),
            handler,
            cmd_rx,
            cancel.clone(),
        ));

        Connection {
            cmd_tx,
            event_tx,
            task,
            _cancel: cancel.drop_guard(),
        }
    }

    /// Subscribe to unsolicited device events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_tx.subscribe()
    }

    /// Returns `true` once the IO task has stopped.
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    /// Shut down the IO task and recover the transport.
    ///
    /// Outstanding transactions fail with [`Error::Closed`] and the
    /// transport is closed before it is handed back.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .cmd_tx
            .send(Command::Shutdown { reply: reply_tx })
            .await;
        let transport = reply_rx.await.map_err(|_| Error::Closed)?;
        let _ = self.task.await;
        Ok(transport)
    }
}

#[async_trait]
impl Dispatcher for Connection {
    async fn execute(&self, requests: Vec<TextRequest>) -> Result<Vec<PendingReply>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let mut batch = Vec::with_capacity(requests.len());
        let mut pending = Vec::with_capacity(requests.len());
        for request in requests {
            let (slot, reply) = PendingReply::channel();
            batch.push((request, slot));
            pending.push(reply);
        }
        self.cmd_tx
            .send(Command::Submit { batch })
            .await
            .map_err(|_| Error::Closed)?;
        Ok(pending)
    }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

/// Maximum partial-line size before reset to prevent unbounded growth.
const MAX_BUF: usize = 8192;

/// How far in the future an idle deadline timer is parked.
const IDLE_WAKE: Duration = Duration::from_secs(3600);

/// The main IO loop. Runs as a spawned Tokio task.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Submissions and shutdown
/// 3. The head transaction's deadline
/// 4. Reading the link
async fn io_loop(
    mut transport: Box<dyn Transport>,
    config: IoConfig,
    event_tx: broadcast::Sender<DeviceEvent>,
    handler: Box<dyn UnsolicitedHandler>,
    mut cmd_rx: mpsc::Receiver<Command>,
    cancel: CancellationToken,
) {
    let mut lines = LineBuffer::new();
    let mut matcher: ReplyMatcher<Slot> = ReplyMatcher::new(config.discard_orphans);
    let mut recv_buf = [0u8; 256];
    let mut link_down = false;

    loop {
        let head_deadline = matcher.next_deadline();
        let wake_at = head_deadline.unwrap_or_else(|| Instant::now() + IDLE_WAKE);

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("dispatcher IO task cancelled");
                fail_all(&mut matcher, || Error::Closed);
                let _ = transport.close().await;
                break;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Submit { batch }) => {
                        submit(&mut *transport, &config, &mut matcher, batch).await;
                    }
                    Some(Command::Shutdown { reply }) => {
                        debug!(pending = matcher.len(), "dispatcher shutdown requested");
                        fail_all(&mut matcher, || Error::Closed);
                        if let Err(e) = transport.close().await {
                            warn!(error = %e, "error closing transport");
                        }
                        let _ = event_tx.send(DeviceEvent::Disconnected);
                        let _ = reply.send(transport);
                        return;
                    }
                    None => {
                        debug!("command channel closed, exiting IO task");
                        fail_all(&mut matcher, || Error::Closed);
                        break;
                    }
                }
            }

            _ = tokio::time::sleep_until(wake_at), if head_deadline.is_some() => {
                expire_due(&mut matcher, &event_tx, Instant::now());
            }

            result = transport.receive(&mut recv_buf, config.poll_interval), if !link_down => {
                match result {
                    Ok(n) => {
                        trace!(bytes = n, "received");
                        lines.push(&recv_buf[..n]);
                        while let Some(line) = lines.next_line() {
                            let now = Instant::now();
                            expire_due(&mut matcher, &event_tx, now);
                            dispatch_line(&mut matcher, &*handler, &event_tx, line, now);
                        }
                        if lines.len() > MAX_BUF {
                            warn!(len = lines.len(), "line buffer overflow, resetting");
                            lines.clear();
                        }
                    }
                    Err(Error::Timeout) => {}
                    Err(e @ (Error::NotConnected | Error::ConnectionLost)) => {
                        error!(error = %e, pending = matcher.len(), "link lost");
                        link_down = true;
                        fail_all(&mut matcher, || Error::receive(Error::ConnectionLost));
                    }
                    Err(e) => {
                        error!(error = %e, pending = matcher.len(), "receive failed");
                        let message = e.to_string();
                        fail_all(&mut matcher, || Error::receive(Error::Transport(message.clone())));
                        lines.clear();
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }
    }
}

/// Write every request of a batch and queue the ones that went out.
async fn submit(
    transport: &mut dyn Transport,
    config: &IoConfig,
    matcher: &mut ReplyMatcher<Slot>,
    batch: Vec<(TextRequest, Slot)>,
) {
    for (request, slot) in batch {
        trace!(command = %request.command(), "send");
        match transport.write_line(request.command(), &config.newline).await {
            Ok(()) => {
                let timeout = request.timeout().unwrap_or(config.read_timeout);
                matcher.push(
                    request.command(),
                    request.terminal().clone(),
                    timeout,
                    slot,
                    Instant::now(),
                );
            }
            Err(e) => {
                warn!(command = %request.command(), error = %e, "send failed");
                let _ = slot.send(Err(Error::send(e)));
            }
        }
    }
}

/// Fail every transaction whose deadline has passed.
fn expire_due(
    matcher: &mut ReplyMatcher<Slot>,
    event_tx: &broadcast::Sender<DeviceEvent>,
    now: Instant,
) {
    while let Some(expired) = matcher.expire(now) {
        let _ = event_tx.send(DeviceEvent::TransactionTimedOut {
            command: expired.command,
        });
        let _ = expired.token.send(Err(Error::Timeout));
    }
}

/// Route one received line.
fn dispatch_line(
    matcher: &mut ReplyMatcher<Slot>,
    handler: &dyn UnsolicitedHandler,
    event_tx: &broadcast::Sender<DeviceEvent>,
    line: String,
    now: Instant,
) {
    match matcher.feed(line, now) {
        Feed::Complete { token, reply } => {
            let _ = token.send(Ok(reply));
        }
        Feed::Unsolicited(line) => {
            debug!(line = %line, "unsolicited line");
            handler.process(&line, event_tx);
        }
        Feed::Accumulated | Feed::OrphanDiscarded { .. } => {}
    }
}

fn fail_all(matcher: &mut ReplyMatcher<Slot>, mut err: impl FnMut() -> Error) {
    for slot in matcher.drain() {
        let _ = slot.send(Err(err()));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
