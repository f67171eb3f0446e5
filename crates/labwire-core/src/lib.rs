//! labwire-core: Core traits, types, and error definitions for labwire.
//!
//! This crate defines the device-agnostic abstractions shared by every
//! instrument adapter: the byte-level [`Transport`], the [`TextRequest`] /
//! [`Reply`] pair submitted to a [`Dispatcher`], and the error taxonomy that
//! all failures propagate through unchanged.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`TextRequest`] / [`Terminal`] -- a command and its end-of-reply rule
//! - [`Dispatcher`] -- submits requests and resolves replies in order
//! - [`ReferenceMeter`], [`Source`], [`ZifSocket`] -- device-family traits
//! - [`DeviceEvent`] -- unsolicited device data
//! - [`Error`] / [`Result`] / [`Problem`] -- error handling

pub mod config;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod problem;
pub mod request;
pub mod transport;
pub mod types;

pub use config::DeviceOptions;
pub use device::{ReferenceMeter, Source, ZifSocket};
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use events::DeviceEvent;
pub use problem::Problem;
pub use request::{PendingReply, Reply, Terminal, TextRequest};
pub use transport::Transport;
pub use types::*;
