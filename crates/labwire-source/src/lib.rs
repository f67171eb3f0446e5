//! Programmable source backend for labwire.
//!
//! Sources speak the same `\r`-terminated text protocol family as the
//! reference meters. A loadpoint (frequency, voltage and current per phase,
//! output activation) is programmed as a batch of four acknowledged
//! commands. This crate provides:
//!
//! - **Request builders** ([`commands`]) -- loadpoint encoding and
//!   validation against model limits.
//! - **Model definitions** ([`models`]) -- output limits per supported model
//!   and [`capabilities_for`](models::capabilities_for).
//! - **SourceDevice** ([`source`]) -- the [`Source`](labwire_core::Source)
//!   implementation on top of a dispatcher.
//! - **SourceBuilder** ([`builder`]) -- fluent construction.

pub mod builder;
pub mod commands;
pub mod models;
pub mod source;

pub use builder::SourceBuilder;
pub use models::capabilities_for;
pub use source::SourceDevice;
