//! The ZIF framer state machine and the IO task that owns the link.
//!
//! [`Framer`] runs one exchange at a time through
//! `Idle -> Sending -> AwaitingAck -> AwaitingPayload -> Idle`. The protocol
//! is half-duplex, so the IO task behind [`ZifIo`] processes exchanges
//! strictly one after the other. Between exchanges it drains stray bytes so
//! that a late or over-long reply cannot leak into the next one.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

use labwire_core::config::DeviceOptions;
use labwire_core::error::{Error, Result};
use labwire_core::transport::Transport;

use crate::frame::{ACK, Frame, NAK};

// ---------------------------------------------------------------------------
// Framer
// ---------------------------------------------------------------------------

/// Where an exchange currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    Idle,
    Sending,
    AwaitingAck,
    AwaitingPayload,
}

/// Runs single request/reply exchanges over a borrowed transport.
#[derive(Debug)]
pub struct Framer {
    state: FramerState,
    read_timeout: Duration,
}

impl Framer {
    /// A framer that waits up to `read_timeout` for each reply read.
    pub fn new(read_timeout: Duration) -> Self {
        Framer {
            state: FramerState::Idle,
            read_timeout,
        }
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Send `frame` and collect its validated reply data.
    ///
    /// The framer is back in [`FramerState::Idle`] when this returns,
    /// whether the exchange succeeded or not.
    pub async fn exchange(&mut self, transport: &mut dyn Transport, frame: &Frame) -> Result<Vec<u8>> {
        let result = self.run(transport, frame).await;
        self.enter(FramerState::Idle);
        match &result {
            Err(e) if e.is_link_failure() => {
                warn!(opcode = frame.spec().name, error = %e, "exchange failed on the link");
            }
            Err(e) => debug!(opcode = frame.spec().name, error = %e, "exchange failed"),
            Ok(_) => {}
        }
        result
    }

    async fn run(&mut self, transport: &mut dyn Transport, frame: &Frame) -> Result<Vec<u8>> {
        self.enter(FramerState::Sending);
        let bytes = frame.encode();
        trace!(opcode = frame.spec().name, data = ?bytes, "send");
        transport.send(&bytes).await.map_err(Error::send)?;

        self.enter(FramerState::AwaitingAck);
        let mut first = [0u8; 1];
        match transport.receive(&mut first, self.read_timeout).await {
            Ok(0) | Err(Error::Timeout) => return Err(Error::NoMoreData),
            Ok(_) => {}
            Err(e) => return Err(Error::receive(e)),
        }
        match first[0] {
            ACK => {}
            NAK => return Err(Error::Nak),
            received => {
                return Err(Error::OutOfBand {
                    received,
                    expected: ACK,
                });
            }
        }

        let wanted = frame.spec().wire_len();
        if wanted == 0 {
            return Ok(Vec::new());
        }

        self.enter(FramerState::AwaitingPayload);
        let mut payload = vec![0u8; wanted];
        let mut got = 0;
        while got < wanted {
            match transport.receive(&mut payload[got..], self.read_timeout).await {
                Ok(0) | Err(Error::Timeout) => break,
                Ok(n) => got += n,
                Err(e) => return Err(Error::receive(e)),
            }
        }
        trace!(opcode = frame.spec().name, data = ?&payload[..got], "reply");
        frame.verify(&payload[..got])
    }

    fn enter(&mut self, next: FramerState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "framer state");
            self.state = next;
        }
    }
}

// ---------------------------------------------------------------------------
// IO task
// ---------------------------------------------------------------------------

/// Configuration for the ZIF IO task.
#[derive(Debug, Clone)]
pub struct ZifConfig {
    /// How long each reply read may wait.
    pub read_timeout: Duration,
    /// Upper bound on one idle drain read.
    pub poll_interval: Duration,
}

impl Default for ZifConfig {
    fn default() -> Self {
        ZifConfig {
            read_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl ZifConfig {
    pub fn from_options(options: &DeviceOptions) -> Self {
        ZifConfig {
            read_timeout: options.read_timeout(),
            ..ZifConfig::default()
        }
    }
}

enum Command {
    Exchange {
        frame: Frame,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
    /// Graceful shutdown; returns the transport for recovery.
    Shutdown {
        reply: oneshot::Sender<Box<dyn Transport>>,
    },
}

/// Handle to the ZIF IO task.
///
/// Dropping the handle cancels the task and closes the transport.
pub struct ZifIo {
    cmd_tx: mpsc::Sender<Command>,
    task: JoinHandle<()>,
    _cancel: DropGuard,
}

impl ZifIo {
    /// Spawn the IO task over `transport`.
    pub fn spawn(transport: Box<dyn Transport>, config: ZifConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(32);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(io_loop(transport, config, cmd_rx, cancel.clone()));

        ZifIo {
            cmd_tx,
            task,
            _cancel: cancel.drop_guard(),
        }
    }

    /// Run one exchange and return the validated reply data.
    pub async fn exchange(&self, frame: Frame) -> Result<Vec<u8>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Exchange {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Closed)?;
        reply_rx.await.unwrap_or(Err(Error::Closed))
    }

    /// Shut down the IO task and recover the (closed) transport.
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

/// The main IO loop. Runs as a spawned Tokio task.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Exchanges and shutdown
/// 3. Draining stray bytes while idle
async fn io_loop(
    mut transport: Box<dyn Transport>,
    config: ZifConfig,
    mut cmd_rx: mpsc::Receiver<Command>,
    cancel: CancellationToken,
) {
    let mut framer = Framer::new(config.read_timeout);
    let mut drain_buf = [0u8; 64];
    let mut link_down = false;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("ZIF IO task cancelled");
                let _ = transport.close().await;
                break;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Exchange { frame, reply }) => {
                        let result = framer.exchange(&mut *transport, &frame).await;
                        if let Err(Error::Receive(inner)) = &result {
                            if matches!(**inner, Error::NotConnected | Error::ConnectionLost) {
                                link_down = true;
                            }
                        }
                        let _ = reply.send(result);
                    }
                    Some(Command::Shutdown { reply }) => {
                        debug!("ZIF IO task shutdown requested");
                        if let Err(e) = transport.close().await {
                            warn!(error = %e, "error closing transport");
                        }
                        let _ = reply.send(transport);
                        return;
                    }
                    None => {
                        debug!("command channel closed, exiting ZIF IO task");
                        break;
                    }
                }
            }

            result = transport.receive(&mut drain_buf, config.poll_interval), if !link_down => {
                match result {
                    Ok(n) => {
                        warn!(bytes = n, data = ?&drain_buf[..n], "discarding stray bytes");
                    }
                    Err(Error::Timeout) => {}
                    Err(e @ (Error::NotConnected | Error::ConnectionLost)) => {
                        warn!(error = %e, "link lost");
                        link_down = true;
                    }
                    Err(e) => {
                        warn!(error = %e, "idle read failed");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{OP_VERSION, checksum, parse_version};
    use labwire_test_harness::{MockTransport, ScriptedReply};

    fn framer() -> Framer {
        Framer::new(Duration::from_secs(1))
    }

    // =======================================================================
    // Framer: the version probe matrix
    // =======================================================================

    #[tokio::test(start_paused = true)]
    async fn version_reply_parses() {
        let mut mock = MockTransport::new();
        mock.expect(&[OP_VERSION], &[0x06, 0x01, 0x00, 0x00, 0x00, 0x02]);

        let mut framer = framer();
        let data = framer.exchange(&mut mock, &Frame::version()).await.unwrap();
        assert_eq!(parse_version(&data).unwrap(), "1.2");
        assert_eq!(framer.state(), FramerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn four_byte_reply_is_bad_length() {
        let mut mock = MockTransport::new();
        mock.expect(&[OP_VERSION], &[0x06, 0x01, 0x00, 0x00, 0x00]);

        let result = framer().exchange(&mut mock, &Frame::version()).await;
        assert!(matches!(
            result,
            Err(Error::BadLength {
                expected: 5,
                actual: 4
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn nak_is_rejected() {
        let mut mock = MockTransport::new();
        mock.expect(&[OP_VERSION], &[0x15]);

        let mut framer = framer();
        let result = framer.exchange(&mut mock, &Frame::version()).await;
        assert!(matches!(result, Err(Error::Nak)));
        assert_eq!(framer.state(), FramerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_first_byte_is_out_of_band() {
        let mut mock = MockTransport::new();
        mock.expect(&[OP_VERSION], &[0x99]);

        match framer().exchange(&mut mock, &Frame::version()).await {
            Err(Error::OutOfBand { received, expected }) => {
                assert_eq!(received, 0x99);
                assert_eq!(expected, 0x06);
            }
            other => panic!("expected OutOfBand, got: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silence_is_no_more_data() {
        let mut mock = MockTransport::new();
        mock.expect(&[OP_VERSION], &[]);

        let result = framer().exchange(&mut mock, &Frame::version()).await;
        assert!(matches!(result, Err(Error::NoMoreData)));
    }

    #[tokio::test(start_paused = true)]
    async fn ack_without_payload_is_no_more_data() {
        let mut mock = MockTransport::new();
        mock.expect(&[OP_VERSION], &[0x06]);

        let result = framer().exchange(&mut mock, &Frame::version()).await;
        assert!(matches!(result, Err(Error::NoMoreData)));
    }

    #[tokio::test(start_paused = true)]
    async fn single_payload_byte_is_too_short() {
        let mut mock = MockTransport::new();
        mock.expect(&[OP_VERSION], &[0x06, 0x01]);

        let result = framer().exchange(&mut mock, &Frame::version()).await;
        assert!(matches!(result, Err(Error::ReplyTooShort { expected: 2, actual: 1 })));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_reply_within_timeout() {
        let mut mock = MockTransport::new();
        mock.expect_reply(
            &[OP_VERSION],
            ScriptedReply::delayed([0x06u8, 0x03, 0x00, 0x00, 0x00, 0x07], Duration::from_millis(300)),
        );

        let data = framer().exchange(&mut mock, &Frame::version()).await.unwrap();
        assert_eq!(parse_version(&data).unwrap(), "3.7");
    }

    #[tokio::test(start_paused = true)]
    async fn serial_number_checksum_mismatch() {
        let mut mock = MockTransport::new();
        let data = [0x01, 0x02, 0x03, 0x04];
        let bad = checksum(0xC4, &data).wrapping_add(1);
        mock.expect(&[0xC4], &[0x06, 0x01, 0x02, 0x03, 0x04, bad]);

        let result = framer().exchange(&mut mock, &Frame::serial_number()).await;
        assert!(matches!(result, Err(Error::ChecksumMismatch { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_is_send_error() {
        let mut mock = MockTransport::new();
        mock.expect_send_failure(&[OP_VERSION]);

        match framer().exchange(&mut mock, &Frame::version()).await {
            Err(Error::Send(inner)) => assert!(matches!(*inner, Error::Transport(_))),
            other => panic!("expected Send error, got: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn closed_link_is_send_error() {
        let mut mock = MockTransport::new();
        mock.set_connected(false);

        let result = framer().exchange(&mut mock, &Frame::version()).await;
        assert!(matches!(result, Err(Error::Send(_))));
    }

    // =======================================================================
    // IO task
    // =======================================================================

    #[tokio::test(start_paused = true)]
    async fn io_task_runs_exchanges_in_order() {
        let mut mock = MockTransport::new();
        mock.expect(&[OP_VERSION], &[0x06, 0x02, 0x00, 0x00, 0x00, 0x05]);
        mock.expect(&[0xC3, 0x01, 0x01, 0xC5], &[0x06]);
        let sent = mock.sent_log();

        let io = ZifIo::spawn(Box::new(mock), ZifConfig::default());
        let version = io.exchange(Frame::version()).await.unwrap();
        assert_eq!(parse_version(&version).unwrap(), "2.5");
        let ack = io.exchange(Frame::set_active(1, true)).await.unwrap();
        assert!(ack.is_empty());
        assert_eq!(sent.commands(), vec![vec![0xC2], vec![0xC3, 0x01, 0x01, 0xC5]]);
    }

    #[tokio::test(start_paused = true)]
    async fn io_task_drains_stray_bytes_between_exchanges() {
        let mut mock = MockTransport::new();
        // Over-long reply: the sixth data byte is left on the link.
        mock.expect(&[OP_VERSION], &[0x06, 0x01, 0x00, 0x00, 0x00, 0x02, 0xEE]);
        mock.expect(&[OP_VERSION], &[0x06, 0x01, 0x00, 0x00, 0x00, 0x03]);

        let io = ZifIo::spawn(Box::new(mock), ZifConfig::default());
        let first = io.exchange(Frame::version()).await.unwrap();
        assert_eq!(parse_version(&first).unwrap(), "1.2");
        tokio::time::sleep(Duration::from_millis(500)).await;
        let second = io.exchange(Frame::version()).await.unwrap();
        assert_eq!(parse_version(&second).unwrap(), "1.3");
    }

    #[tokio::test(start_paused = true)]
    async fn io_task_failure_does_not_poison_next_exchange() {
        let mut mock = MockTransport::new();
        mock.expect(&[OP_VERSION], &[0x15]);
        mock.expect(&[OP_VERSION], &[0x06, 0x04, 0x00, 0x00, 0x00, 0x00]);

        let io = ZifIo::spawn(Box::new(mock), ZifConfig::default());
        assert!(matches!(io.exchange(Frame::version()).await, Err(Error::Nak)));
        let data = io.exchange(Frame::version()).await.unwrap();
        assert_eq!(parse_version(&data).unwrap(), "4.0");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_closed_transport() {
        let io = ZifIo::spawn(Box::new(MockTransport::new()), ZifConfig::default());
        let transport = io.shutdown().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[test]
    fn config_from_options() {
        let options = DeviceOptions {
            read_timeout_ms: 250,
            ..DeviceOptions::default()
        };
        assert_eq!(
            ZifConfig::from_options(&options).read_timeout,
            Duration::from_millis(250)
        );
    }
}
