//! Error types for labwire.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-level, framing-level, and
//! adapter-level failures are all captured here so that they propagate to
//! the caller unchanged.
//!
//! Every variant has a stable machine-readable [`code`](Error::code) and an
//! HTTP-like [`status`](Error::status) so that a web layer can turn any
//! failure into a structured [`Problem`](crate::problem::Problem).

/// The error type for all labwire operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Writing to the underlying transport failed.
    #[error("send failed: {0}")]
    Send(#[source] Box<Error>),

    /// Reading from the underlying transport failed or was interrupted.
    #[error("receive failed: {0}")]
    Receive(#[source] Box<Error>),

    /// No terminal match (text) or no byte (binary) arrived within the deadline.
    #[error("timeout waiting for response")]
    Timeout,

    /// The transport yielded no bytes when at least one was required.
    #[error("no more data")]
    NoMoreData,

    /// Fewer payload bytes arrived than the response type requires.
    #[error("reply too short: expected at least {expected} bytes, got {actual}")]
    ReplyTooShort {
        /// Minimum number of bytes the response type requires.
        expected: usize,
        /// Number of bytes actually received.
        actual: usize,
    },

    /// The payload length differs from the length fixed for the opcode.
    #[error("bad reply length: expected {expected} bytes, got {actual}")]
    BadLength {
        /// Length fixed by the protocol for this opcode.
        expected: usize,
        /// Number of bytes actually received.
        actual: usize,
    },

    /// The device explicitly rejected the command.
    #[error("device returned NAK")]
    Nak,

    /// The first reply byte was neither ACK nor NAK.
    #[error("out-of-band reply byte 0x{received:02X} (expected 0x{expected:02X})")]
    OutOfBand {
        /// The byte the device sent.
        received: u8,
        /// The acknowledgement byte that was expected.
        expected: u8,
    },

    /// The checksum computed over a received payload does not match the
    /// checksum byte the device sent.
    #[error("checksum mismatch: computed 0x{computed:02X}, received 0x{received:02X}")]
    ChecksumMismatch {
        /// Checksum computed locally over the payload.
        computed: u8,
        /// Checksum byte received from the device.
        received: u8,
    },

    /// No connection to the device has been established.
    #[error("not connected")]
    NotConnected,

    /// The adapter is missing configuration it needs before it can be used.
    #[error("not ready: {0}")]
    NotReady(String),

    /// A transport-level error (serial port, TCP socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (unexpected or malformed reply).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The requested operation is not supported by this device.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The device reported a model name that has no capability entry.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// An invalid parameter was passed to a device command.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The connection was shut down while the request was outstanding.
    #[error("connection closed")]
    Closed,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a transport failure that happened while writing.
    pub fn send(source: Error) -> Self {
        Error::Send(Box::new(source))
    }

    /// Wrap a transport failure that happened while reading.
    pub fn receive(source: Error) -> Self {
        Error::Receive(Box::new(source))
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Send(_) => "SEND_FAILED",
            Error::Receive(_) => "RECEIVE_FAILED",
            Error::Timeout => "TIMEOUT",
            Error::NoMoreData => "NO_MORE_DATA",
            Error::ReplyTooShort { .. } => "REPLY_TOO_SHORT",
            Error::BadLength { .. } => "BAD_LENGTH",
            Error::Nak => "NAK",
            Error::OutOfBand { .. } => "OUT_OF_BAND",
            Error::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
            Error::NotConnected => "NOT_CONNECTED",
            Error::NotReady(_) => "NOT_READY",
            Error::Transport(_) => "TRANSPORT",
            Error::Protocol(_) => "COMMAND_FAILED",
            Error::Unsupported(_) => "UNSUPPORTED",
            Error::UnsupportedModel(_) => "UNSUPPORTED_MODEL",
            Error::InvalidParameter(_) => "INVALID_PARAMETER",
            Error::ConnectionLost => "CONNECTION_LOST",
            Error::Closed => "CLOSED",
            Error::Io(_) => "IO",
        }
    }

    /// HTTP-like status code a web layer should report for this error.
    pub fn status(&self) -> u16 {
        match self {
            Error::NotReady(_) | Error::InvalidParameter(_) => 400,
            Error::Unsupported(_) | Error::UnsupportedModel(_) => 406,
            Error::NotConnected | Error::Timeout => 408,
            Error::Send(_)
            | Error::Receive(_)
            | Error::ConnectionLost
            | Error::Closed
            | Error::Transport(_) => 410,
            Error::NoMoreData
            | Error::ReplyTooShort { .. }
            | Error::BadLength { .. }
            | Error::Nak
            | Error::OutOfBand { .. }
            | Error::ChecksumMismatch { .. }
            | Error::Protocol(_) => 422,
            Error::Io(_) => 500,
        }
    }

    /// Returns `true` for failures caused by the device link rather than by
    /// the device's answer.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Error::Send(_)
                | Error::Receive(_)
                | Error::NotConnected
                | Error::ConnectionLost
                | Error::Closed
                | Error::Io(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
