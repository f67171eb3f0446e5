//! Transport trait for device communication.
//!
//! The [`Transport`] trait abstracts over the physical link to an
//! instrument. Implementations exist for serial ports and TCP sockets
//! (`labwire-transport`) and a scripted mock for testing
//! (`labwire-test-harness`).
//!
//! The transport has no protocol knowledge. Line framing and reply matching
//! are handled by the dispatcher in `labwire-text-io`; fixed-length binary
//! exchanges by the framer in `labwire-zif`. Both take exclusive ownership
//! of a `Box<dyn Transport>`, so the link always has a single writer and a
//! single reader.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a device.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the device.
    ///
    /// Implementations should block until all bytes have been written to
    /// the underlying link (serial TX buffer, TCP socket, etc.).
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if no data is received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// Must be safe to call more than once. After calling `close()`,
    /// subsequent `send()` and `receive()` calls should return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Send one line of text followed by `newline`.
    async fn write_line(&mut self, text: &str, newline: &str) -> Result<()> {
        let mut data = Vec::with_capacity(text.len() + newline.len());
        data.extend_from_slice(text.as_bytes());
        data.extend_from_slice(newline.as_bytes());
        self.send(&data).await
    }
}
