//! Structured problem descriptions for failures.
//!
//! A [`Problem`] is what a web layer hands back to its client when a device
//! operation fails: the HTTP-like status, a machine-readable code, and the
//! human message.

use serde::Serialize;

use crate::error::Error;

/// A serializable description of a failed device operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Problem {
    /// HTTP-like status code (see [`Error::status`]).
    pub status: u16,
    /// Machine-readable error code (see [`Error::code`]).
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl From<&Error> for Problem {
    fn from(err: &Error) -> Self {
        Problem {
            status: err.status(),
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<Error> for Problem {
    fn from(err: Error) -> Self {
        Problem::from(&err)
    }
}
