//! ZIF frame encoder and reply validator.
//!
//! The ZIF controller speaks a half-duplex binary protocol. Every exchange
//! is one request frame from the host and one reply from the controller.
//! This module handles the pure byte-level part: building request frames,
//! computing checksums, and validating the payload bytes that follow the
//! acknowledgement.
//!
//! # Frame format
//!
//! ```text
//! request:  <opcode> [<payload>...] [<checksum>]
//! reply:    <ACK | NAK> [<data>...] [<checksum>]
//! ```
//!
//! - `opcode`: one command byte (`0xC2` version, `0xC3` set-active,
//!   `0xC4` serial number)
//! - `checksum`: 8-bit wrapping sum of the opcode and every payload or data
//!   byte; present only for opcodes that call for it
//! - `ACK` (`0x06`) / `NAK` (`0x15`): first reply byte
//!
//! Reply lengths are fixed per opcode, see [`OpcodeSpec`].

use bytes::{BufMut, BytesMut};
use labwire_core::error::{Error, Result};

/// Positive acknowledgement, first byte of every accepted reply.
pub const ACK: u8 = 0x06;

/// Negative acknowledgement; the controller rejected the command.
pub const NAK: u8 = 0x15;

/// Opcode: read firmware version.
pub const OP_VERSION: u8 = 0xC2;

/// Opcode: switch a socket on or off.
pub const OP_SET_ACTIVE: u8 = 0xC3;

/// Opcode: read controller serial number.
pub const OP_SERIAL_NUMBER: u8 = 0xC4;

/// Static framing rules for one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeSpec {
    /// The command byte.
    pub opcode: u8,
    /// Short name for logs.
    pub name: &'static str,
    /// Whether the request carries a trailing checksum byte.
    pub request_checksum: bool,
    /// Number of data bytes after the ACK.
    pub reply_len: usize,
    /// Fewest reply bytes that still count as a (malformed) reply rather
    /// than a truncated one.
    pub min_reply_len: usize,
    /// Whether the reply data is followed by a checksum byte.
    pub reply_checksum: bool,
}

impl OpcodeSpec {
    /// Total bytes expected after the ACK, checksum included.
    pub fn wire_len(&self) -> usize {
        self.reply_len + usize::from(self.reply_checksum)
    }
}

/// `0xC2`: five data bytes, no checksum.
pub const VERSION: OpcodeSpec = OpcodeSpec {
    opcode: OP_VERSION,
    name: "version",
    request_checksum: false,
    reply_len: 5,
    min_reply_len: 2,
    reply_checksum: false,
};

/// `0xC3`: `[socket, on]` payload, checksummed request, ACK-only reply.
pub const SET_ACTIVE: OpcodeSpec = OpcodeSpec {
    opcode: OP_SET_ACTIVE,
    name: "set-active",
    request_checksum: true,
    reply_len: 0,
    min_reply_len: 0,
    reply_checksum: false,
};

/// `0xC4`: four little-endian data bytes plus checksum.
pub const SERIAL_NUMBER: OpcodeSpec = OpcodeSpec {
    opcode: OP_SERIAL_NUMBER,
    name: "serial-number",
    request_checksum: false,
    reply_len: 4,
    min_reply_len: 5,
    reply_checksum: true,
};

/// 8-bit wrapping sum of `opcode` followed by `data`.
///
/// ```
/// use labwire_zif::frame::checksum;
///
/// assert_eq!(checksum(0xC3, &[0x02, 0x01]), 0xC6);
/// assert_eq!(checksum(0xFF, &[0x02]), 0x01);
/// ```
pub fn checksum(opcode: u8, data: &[u8]) -> u8 {
    data.iter().fold(opcode, |sum, &b| sum.wrapping_add(b))
}

/// One request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    spec: OpcodeSpec,
    payload: Vec<u8>,
}

impl Frame {
    /// A frame for `spec` carrying `payload`.
    pub fn new(spec: OpcodeSpec, payload: Vec<u8>) -> Self {
        Frame { spec, payload }
    }

    /// Read firmware version.
    pub fn version() -> Self {
        Frame::new(VERSION, Vec::new())
    }

    /// Read serial number.
    pub fn serial_number() -> Self {
        Frame::new(SERIAL_NUMBER, Vec::new())
    }

    /// Switch `socket` on or off.
    pub fn set_active(socket: u8, on: bool) -> Self {
        Frame::new(SET_ACTIVE, vec![socket, u8::from(on)])
    }

    /// The framing rules this frame is sent under.
    pub fn spec(&self) -> &OpcodeSpec {
        &self.spec
    }

    /// Checksum over opcode and payload.
    pub fn checksum(&self) -> u8 {
        checksum(self.spec.opcode, &self.payload)
    }

    /// Raw bytes ready for transmission.
    ///
    /// ```
    /// use labwire_zif::frame::Frame;
    ///
    /// assert_eq!(Frame::version().encode(), vec![0xC2]);
    /// assert_eq!(Frame::set_active(2, true).encode(), vec![0xC3, 0x02, 0x01, 0xC6]);
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let capacity = 1 + self.payload.len() + usize::from(self.spec.request_checksum);
        let mut buf = BytesMut::with_capacity(capacity);
        buf.put_u8(self.spec.opcode);
        buf.put_slice(&self.payload);
        if self.spec.request_checksum {
            buf.put_u8(self.checksum());
        }
        buf.to_vec()
    }

    /// Validate the bytes received after the ACK and return the data part.
    ///
    /// Checks run in this order: nothing at all ([`Error::NoMoreData`]),
    /// fewer than the minimum ([`Error::ReplyTooShort`]), any other length
    /// mismatch ([`Error::BadLength`]), then the checksum
    /// ([`Error::ChecksumMismatch`]).
    pub fn verify(&self, received: &[u8]) -> Result<Vec<u8>> {
        let spec = &self.spec;
        let expected = spec.wire_len();
        if expected == 0 {
            return Ok(Vec::new());
        }
        if received.is_empty() {
            return Err(Error::NoMoreData);
        }
        if received.len() < spec.min_reply_len {
            return Err(Error::ReplyTooShort {
                expected: spec.min_reply_len,
                actual: received.len(),
            });
        }
        if received.len() != expected {
            return Err(Error::BadLength {
                expected,
                actual: received.len(),
            });
        }

        let (data, trailer) = received.split_at(spec.reply_len);
        if let Some(&sent) = trailer.first() {
            let computed = checksum(spec.opcode, data);
            if computed != sent {
                return Err(Error::ChecksumMismatch {
                    computed,
                    received: sent,
                });
            }
        }
        Ok(data.to_vec())
    }
}

/// Decode the version reply: a little-endian `i32` major number followed by
/// a one-byte minor number.
///
/// ```
/// use labwire_zif::frame::parse_version;
///
/// assert_eq!(parse_version(&[0x01, 0x00, 0x00, 0x00, 0x02]).unwrap(), "1.2");
/// ```
pub fn parse_version(data: &[u8]) -> Result<String> {
    match data {
        [a, b, c, d, minor] => {
            let major = i32::from_le_bytes([*a, *b, *c, *d]);
            Ok(format!("{major}.{minor}"))
        }
        _ => Err(Error::BadLength {
            expected: VERSION.reply_len,
            actual: data.len(),
        }),
    }
}

/// Decode the serial number reply.
pub fn parse_serial_number(data: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = data.try_into().map_err(|_| Error::BadLength {
        expected: SERIAL_NUMBER.reply_len,
        actual: data.len(),
    })?;
    Ok(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_version_is_bare_opcode() {
        assert_eq!(Frame::version().encode(), vec![OP_VERSION]);
        assert_eq!(Frame::serial_number().encode(), vec![OP_SERIAL_NUMBER]);
    }

    #[test]
    fn encode_set_active_appends_checksum() {
        let frame = Frame::set_active(3, false);
        assert_eq!(frame.checksum(), 0xC6);
        assert_eq!(frame.encode(), vec![0xC3, 0x03, 0x00, 0xC6]);
    }

    #[test]
    fn checksum_wraps() {
        assert_eq!(checksum(0xC4, &[0xFF, 0xFF, 0x00, 0x00]), 0xC2);
        assert_eq!(checksum(0x00, &[]), 0x00);
    }

    #[test]
    fn wire_len_includes_reply_checksum() {
        assert_eq!(VERSION.wire_len(), 5);
        assert_eq!(SET_ACTIVE.wire_len(), 0);
        assert_eq!(SERIAL_NUMBER.wire_len(), 5);
    }

    #[test]
    fn verify_version_reply() {
        let data = Frame::version().verify(&[1, 0, 0, 0, 2]).unwrap();
        assert_eq!(parse_version(&data).unwrap(), "1.2");
    }

    #[test]
    fn verify_empty_is_no_more_data() {
        let result = Frame::version().verify(&[]);
        assert!(matches!(result, Err(Error::NoMoreData)));
    }

    #[test]
    fn verify_below_minimum_is_too_short() {
        let result = Frame::version().verify(&[1]);
        assert!(matches!(
            result,
            Err(Error::ReplyTooShort {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn verify_four_bytes_is_bad_length() {
        let result = Frame::version().verify(&[1, 0, 0, 0]);
        assert!(matches!(
            result,
            Err(Error::BadLength {
                expected: 5,
                actual: 4
            })
        ));
    }

    #[test]
    fn verify_serial_number_checksum() {
        let data = [0x39, 0x30, 0x00, 0x00];
        let sum = checksum(OP_SERIAL_NUMBER, &data);
        let mut reply = data.to_vec();
        reply.push(sum);
        let verified = Frame::serial_number().verify(&reply).unwrap();
        assert_eq!(parse_serial_number(&verified).unwrap(), 12345);

        reply[4] = sum.wrapping_add(1);
        match Frame::serial_number().verify(&reply) {
            Err(Error::ChecksumMismatch { computed, received }) => {
                assert_eq!(computed, sum);
                assert_eq!(received, sum.wrapping_add(1));
            }
            other => panic!("expected ChecksumMismatch, got: {other:?}"),
        }
    }

    #[test]
    fn verify_ack_only_reply() {
        assert!(Frame::set_active(1, true).verify(&[]).unwrap().is_empty());
    }

    #[test]
    fn parse_version_negative_major() {
        assert_eq!(parse_version(&[0xFF, 0xFF, 0xFF, 0xFF, 0]).unwrap(), "-1.0");
    }
}
