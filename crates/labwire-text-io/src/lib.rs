//! Transaction dispatcher for line-oriented instruments.
//!
//! This crate provides the single-IO-task pattern for devices that answer
//! commands with one or more text lines. One tokio task owns the transport
//! exclusively, writes commands in submission order, and resolves each
//! pending transaction when its terminal line arrives or its deadline
//! passes.
//!
//! # Architecture
//!
//! - [`protocol`] -- line splitting and the FIFO reply matcher
//! - [`io`] -- the [`Connection`] handle, spawn, and the select loop

pub mod io;
pub mod protocol;

pub use io::{Connection, IoConfig, PublishUnsolicited, UnsolicitedHandler};
pub use protocol::{Feed, LineBuffer, ReplyMatcher};
