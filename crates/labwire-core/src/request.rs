//! Request and reply types for line-oriented device exchanges.
//!
//! A [`TextRequest`] is an immutable description of one command and of the
//! rule that tells the dispatcher when the device has finished answering.
//! It holds no connection state, so the same request value can be cloned
//! and submitted to any number of connections.
//!
//! # Example
//!
//! ```
//! use labwire_core::request::{TextRequest, Terminal};
//! use std::time::Duration;
//!
//! let version = TextRequest::sentinel("AAV", "AAVACK");
//! let modes = TextRequest::pattern("MI", r"^MI([^;]+;)*$").unwrap()
//!     .with_timeout(Duration::from_secs(2));
//!
//! assert!(version.terminal().matches("AAVACK"));
//! assert!(modes.terminal().matches("MI3LW;MQBase;"));
//! assert!(!modes.terminal().matches("MIxxx"));
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use regex::Regex;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// The rule that marks the last line of a reply.
#[derive(Clone)]
pub enum Terminal {
    /// The line must equal the token exactly.
    Sentinel(String),
    /// The line must start with the token (devices that append data to
    /// their acknowledgement, e.g. `SOKFR` followed by an echo).
    Prefix(String),
    /// The whole line must match the anchored regular expression.
    Pattern(Regex),
}

impl Terminal {
    /// Build an anchored pattern rule.
    ///
    /// The expression is wrapped in `^(?:...)$` so that it always has to
    /// match the complete line, whether or not the caller anchored it.
    pub fn pattern(expr: &str) -> Result<Self> {
        let anchored = format!("^(?:{expr})$");
        Regex::new(&anchored)
            .map(Terminal::Pattern)
            .map_err(|e| Error::InvalidParameter(format!("bad terminal pattern {expr:?}: {e}")))
    }

    /// Returns `true` if `line` completes a reply under this rule.
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Terminal::Sentinel(token) => line == token,
            Terminal::Prefix(token) => line.starts_with(token.as_str()),
            Terminal::Pattern(re) => re.is_match(line),
        }
    }
}

impl fmt::Debug for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminal::Sentinel(t) => f.debug_tuple("Sentinel").field(t).finish(),
            Terminal::Prefix(t) => f.debug_tuple("Prefix").field(t).finish(),
            Terminal::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
        }
    }
}

/// One outgoing command plus its reply rule.
#[derive(Debug, Clone)]
pub struct TextRequest {
    command: String,
    terminal: Terminal,
    timeout: Option<Duration>,
}

impl TextRequest {
    /// A request whose reply ends with a line equal to `token`.
    pub fn sentinel(command: impl Into<String>, token: impl Into<String>) -> Self {
        TextRequest {
            command: command.into(),
            terminal: Terminal::Sentinel(token.into()),
            timeout: None,
        }
    }

    /// A request whose reply ends with a line starting with `token`.
    pub fn prefixed(command: impl Into<String>, token: impl Into<String>) -> Self {
        TextRequest {
            command: command.into(),
            terminal: Terminal::Prefix(token.into()),
            timeout: None,
        }
    }

    /// A request whose reply ends with a line matching `expr`.
    pub fn pattern(command: impl Into<String>, expr: &str) -> Result<Self> {
        Ok(TextRequest {
            command: command.into(),
            terminal: Terminal::pattern(expr)?,
            timeout: None,
        })
    }

    /// Override the connection-wide reply timeout for this request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The command text, without line terminator.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The terminal rule.
    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    /// The per-request timeout override, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// The lines accumulated for one transaction, terminal line included.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    lines: Vec<String>,
}

impl Reply {
    /// Wrap a completed list of lines.
    pub fn new(lines: Vec<String>) -> Self {
        Reply { lines }
    }

    /// All lines in arrival order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The terminal line.
    pub fn terminal_line(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }

    /// Lines before the terminal line.
    pub fn body(&self) -> &[String] {
        match self.lines.split_last() {
            Some((_, body)) => body,
            None => &[],
        }
    }

    /// Consume the reply and return its lines.
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// The result slot of a submitted request.
///
/// Resolves once the dispatcher has matched the reply, timed the request
/// out, or shut down. Dropping a `PendingReply` does not cancel the
/// transaction; its reply is still consumed from the link.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Result<Reply>>,
}

impl PendingReply {
    /// Create a result slot and the sender the dispatcher completes it with.
    pub fn channel() -> (oneshot::Sender<Result<Reply>>, PendingReply) {
        let (tx, rx) = oneshot::channel();
        (tx, PendingReply { rx })
    }
}

impl Future for PendingReply {
    type Output = Result<Reply>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(Error::Closed)))
    }
}
