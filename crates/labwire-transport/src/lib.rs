//! Transport implementations for labwire.
//!
//! This crate provides concrete implementations of the [`Transport`](labwire_core::Transport) trait
//! from `labwire-core` for the physical links bench instruments use:
//!
//! - [`SerialTransport`]: RS-232 lines and USB virtual COM ports (sources,
//!   reference meters, ZIF controllers, barcode scanners)
//! - [`TcpTransport`]: TCP connections to networked error calculators and
//!   serial-to-LAN converters
//!
//! # Example
//!
//! ```no_run
//! use labwire_transport::SerialTransport;
//! use labwire_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> labwire_core::Result<()> {
//! // Ask a ZIF controller for its firmware version
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 9600).await?;
//! transport.send(&[0xC2]).await?;
//!
//! let mut buf = [0u8; 16];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;
pub mod tcp;

pub use serial::{DataBits, Parity, SerialConfig, SerialTransport, StopBits};
pub use tcp::TcpTransport;
