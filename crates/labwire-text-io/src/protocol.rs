//! Line framing and reply matching for line-oriented instruments.
//!
//! Two pieces, both free of IO so they can be tested synchronously:
//!
//! - [`LineBuffer`] splits the raw byte stream into lines. Both `\r` and
//!   `\n` end a line and empty lines are skipped, so CR, LF and CRLF
//!   devices all work unchanged.
//! - [`ReplyMatcher`] owns the FIFO queue of pending transactions and
//!   decides, line by line, which transaction a line belongs to.
//!
//! Matching is strictly head-of-queue: a line is only ever tested against
//! the terminal rule of the oldest unresolved transaction, even when it
//! would also satisfy the rule of a later one.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use labwire_core::request::{Reply, Terminal};

/// Accumulates raw bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Take the next complete, non-empty line, without its terminator.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected;
    /// instruments occasionally emit line noise on power-up.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let end = self.buf.iter().position(|&b| b == b'\r' || b == b'\n')?;
            let line: Vec<u8> = self.buf.drain(..=end).take(end).collect();
            if !line.is_empty() {
                return Some(String::from_utf8_lossy(&line).into_owned());
            }
        }
    }

    /// Number of buffered bytes not yet returned as a line.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if no partial line is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop any buffered partial line.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// A submitted request waiting for its reply.
#[derive(Debug)]
struct Pending<T> {
    command: String,
    terminal: Terminal,
    timeout: Duration,
    /// Set when the transaction becomes head of the queue.
    deadline: Option<Instant>,
    lines: Vec<String>,
    token: T,
}

/// What happened to one fed line.
#[derive(Debug)]
pub enum Feed<T> {
    /// The line was appended to the head transaction's reply.
    Accumulated,
    /// The line completed the head transaction.
    Complete {
        /// The completion token supplied at submission.
        token: T,
        /// All lines of the reply, terminal line included.
        reply: Reply,
    },
    /// The line was recognised as the late reply of a timed-out
    /// transaction and dropped together with the lines gathered since.
    OrphanDiscarded {
        /// Number of lines dropped, the orphan line included.
        dropped: usize,
    },
    /// No transaction was pending.
    Unsolicited(String),
}

/// A transaction removed from the queue because its deadline passed.
#[derive(Debug)]
pub struct Expired<T> {
    /// The command that was never answered in time.
    pub command: String,
    /// Lines that had arrived for it, now discarded.
    pub partial_lines: usize,
    /// The completion token supplied at submission.
    pub token: T,
}

/// FIFO reply matcher.
///
/// `T` is the completion token carried with each transaction (the result
/// slot sender in the dispatcher, plain ids in tests).
///
/// Each transaction's deadline starts when it reaches the head of the
/// queue. When the head expires it is removed before any further line is
/// processed. If orphan discarding is enabled, the expired terminal rule is
/// remembered: the next line that satisfies it is taken to be the late
/// reply and dropped, together with whatever the new head had gathered
/// since the timeout. The rule is forgotten after that one discard, as soon
/// as the new head completes on its own terminal, after a newer timeout, or
/// once the queue runs empty. Devices answer in order, so a late reply can
/// no longer arrive once a later transaction has been answered.
#[derive(Debug)]
pub struct ReplyMatcher<T> {
    queue: VecDeque<Pending<T>>,
    orphan: Option<Terminal>,
    discard_orphans: bool,
}

impl<T> ReplyMatcher<T> {
    /// Create an empty matcher.
    pub fn new(discard_orphans: bool) -> Self {
        ReplyMatcher {
            queue: VecDeque::new(),
            orphan: None,
            discard_orphans,
        }
    }

    /// Queue a transaction behind all earlier ones.
    pub fn push(
        &mut self,
        command: impl Into<String>,
        terminal: Terminal,
        timeout: Duration,
        token: T,
        now: Instant,
    ) {
        let deadline = self.queue.is_empty().then(|| now + timeout);
        self.queue.push_back(Pending {
            command: command.into(),
            terminal,
            timeout,
            deadline,
            lines: Vec::new(),
            token,
        });
    }

    /// Feed one received line.
    pub fn feed(&mut self, line: String, now: Instant) -> Feed<T> {
        let Some(head) = self.queue.front_mut() else {
            self.orphan = None;
            return Feed::Unsolicited(line);
        };

        if let Some(orphan) = &self.orphan {
            if orphan.matches(&line) {
                let dropped = head.lines.len() + 1;
                head.lines.clear();
                self.orphan = None;
                debug!(line = %line, dropped, "discarding late reply of timed-out request");
                return Feed::OrphanDiscarded { dropped };
            }
        }

        let terminal = head.terminal.matches(&line);
        head.lines.push(line);
        if !terminal {
            return Feed::Accumulated;
        }

        self.orphan = None;
        match self.queue.pop_front() {
            Some(done) => {
                debug!(command = %done.command, lines = done.lines.len(), "reply complete");
                self.promote(now);
                Feed::Complete {
                    token: done.token,
                    reply: Reply::new(done.lines),
                }
            }
            None => Feed::Accumulated,
        }
    }

    /// Deadline of the head transaction, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.front().and_then(|p| p.deadline)
    }

    /// Remove the head transaction if its deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Option<Expired<T>> {
        let deadline = self.next_deadline()?;
        if deadline > now {
            return None;
        }
        let head = self.queue.pop_front()?;
        debug!(
            command = %head.command,
            partial_lines = head.lines.len(),
            "request timed out"
        );
        if self.discard_orphans {
            self.orphan = Some(head.terminal);
        }
        self.promote(now);
        Some(Expired {
            command: head.command,
            partial_lines: head.lines.len(),
            token: head.token,
        })
    }

    /// Remove every pending transaction in submission order.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.orphan = None;
        self.queue.drain(..).map(|p| p.token)
    }

    /// Number of pending transactions.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns `true` while a timed-out request's late reply is still
    /// expected.
    pub fn orphan_armed(&self) -> bool {
        self.orphan.is_some()
    }

    /// Start the deadline of the new head, if any.
    fn promote(&mut self, now: Instant) {
        match self.queue.front_mut() {
            Some(head) => {
                if head.deadline.is_none() {
                    head.deadline = Some(now + head.timeout);
                }
            }
            None => self.orphan = None,
        }
    }
}
