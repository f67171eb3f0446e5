//! Reference meter backend for labwire.
//!
//! Reference meters speak a line-oriented text protocol terminated by `\r`.
//! Every command is acknowledged by a fixed sentinel line (`AAVACK`,
//! `AMEACK`, `OKMA`) or, for the mode list, a line matching a pattern. This
//! crate provides:
//!
//! - **Request builders and parsers** ([`commands`]) -- pure functions from
//!   domain calls to [`TextRequest`](labwire_core::TextRequest)s and from
//!   [`Reply`](labwire_core::Reply)s to domain values.
//! - **Mode table** ([`models`]) -- the device codes of every measurement mode.
//! - **RefMeter** ([`meter`]) -- the [`ReferenceMeter`](labwire_core::ReferenceMeter)
//!   implementation on top of a dispatcher.
//! - **RefMeterBuilder** ([`builder`]) -- fluent construction.
//!
//! # Example
//!
//! ```
//! use labwire_refmeter::commands::{parse_measurement_modes, req_measurement_modes};
//! use labwire_core::{MeasurementMode, Reply};
//!
//! let request = req_measurement_modes().unwrap();
//! assert_eq!(request.command(), "MI");
//!
//! let reply = Reply::new(vec!["MI3LW;MQBase;".into()]);
//! let modes = parse_measurement_modes(&reply).unwrap();
//! assert_eq!(modes, vec![MeasurementMode::ThreeWireActivePower, MeasurementMode::MqBase]);
//! ```

pub mod builder;
pub mod commands;
pub mod meter;
pub mod models;

pub use builder::RefMeterBuilder;
pub use meter::RefMeter;
