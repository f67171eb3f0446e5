//! labwire-test-harness: Scripted mock transports for labwire.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the dispatcher and the protocol adapters without real instruments, and
//! [`MockTcpServer`] for adapters that communicate over TCP.

pub mod mock_serial;
pub mod mock_tcp;

pub use mock_serial::{MockTransport, ScriptedReply, SentLog};
pub use mock_tcp::MockTcpServer;
