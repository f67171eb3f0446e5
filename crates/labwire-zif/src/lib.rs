//! ZIF socket controller backend for labwire.
//!
//! ZIF controllers speak a half-duplex binary protocol with fixed-length,
//! optionally checksummed, ACK/NAK-gated replies. This crate provides:
//!
//! - **Frame codec** ([`frame`]) -- build request frames, compute checksums,
//!   validate reply lengths and checksums, decode version and serial number.
//! - **Framer and IO task** ([`io`]) -- the
//!   `Idle -> Sending -> AwaitingAck -> AwaitingPayload` state machine and the
//!   task that owns the transport.
//! - **ZifController** ([`socket`]) -- the [`ZifSocket`](labwire_core::ZifSocket)
//!   implementation.
//! - **ZifBuilder** ([`builder`]) -- fluent construction from a serial port
//!   or device options.
//!
//! # Example
//!
//! ```
//! use labwire_zif::frame::{Frame, parse_version};
//!
//! assert_eq!(Frame::version().encode(), vec![0xC2]);
//!
//! // ACK, then a little-endian major number and a minor byte.
//! let reply = [0x06, 0x01, 0x00, 0x00, 0x00, 0x02];
//! let data = Frame::version().verify(&reply[1..]).unwrap();
//! assert_eq!(parse_version(&data).unwrap(), "1.2");
//! ```

pub mod builder;
pub mod frame;
pub mod io;
pub mod socket;

pub use builder::ZifBuilder;
pub use frame::{Frame, OpcodeSpec};
pub use io::{Framer, FramerState, ZifConfig, ZifIo};
pub use socket::ZifController;
