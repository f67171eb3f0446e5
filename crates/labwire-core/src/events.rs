//! Asynchronous device event types.
//!
//! Events are published by connections through a bounded
//! [`tokio::sync::broadcast`] channel when a device sends data nobody asked
//! for (a barcode scan, a status line). Consumers subscribe and unsubscribe
//! freely over the lifetime of the connection; slow consumers may miss
//! events under heavy load rather than stalling the read loop.

/// An event published by a device connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A line arrived while no transaction was waiting for a reply.
    Unsolicited {
        /// The received line, without terminator.
        line: String,
    },

    /// A barcode reader delivered a scanned code.
    BarcodeScanned {
        /// The decoded barcode text.
        code: String,
    },

    /// A transaction was timed out by the dispatcher.
    TransactionTimedOut {
        /// The command whose reply never completed.
        command: String,
    },

    /// The connection was shut down.
    Disconnected,
}
