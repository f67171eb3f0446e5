//! # labwire -- Transaction engine for electrical test equipment
//!
//! `labwire` talks to laboratory instruments (programmable sources,
//! reference meters, ZIF socket controllers, error calculators, barcode
//! scanners) over serial lines, TCP sockets and HTTP. Commands are
//! serialized onto the link, every reply is matched back to the request
//! that caused it, and every request carries its own timeout.
//!
//! ## Quick Start
//!
//! ```no_run
//! use labwire::ReferenceMeter;
//! use labwire::refmeter::RefMeterBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let meter = RefMeterBuilder::new()
//!         .serial_port("/dev/ttyUSB0")
//!         .build()
//!         .await?;
//!
//!     println!("{}", meter.version().await?);
//!     let values = meter.measure().await?;
//!     println!("U1 = {} V, f = {} Hz", values.voltages[0], values.frequency);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                   | Purpose                                            |
//! |-------------------------|----------------------------------------------------|
//! | `labwire-core`          | Traits, request/reply types, errors, options       |
//! | `labwire-transport`     | Serial and TCP transports                          |
//! | `labwire-text-io`       | Dispatcher for line-oriented devices               |
//! | `labwire-zif`           | Binary ZIF socket protocol                         |
//! | `labwire-refmeter`      | Reference meter adapter                            |
//! | `labwire-source`        | Programmable source adapter                        |
//! | `labwire-probe`         | Error-calculator and HTTP probes, barcode reader   |
//! | **`labwire`**           | This facade crate -- re-exports everything         |
//!
//! Adapters never touch a transport directly. Text devices submit
//! [`TextRequest`]s to a [`Dispatcher`]; the ZIF controller exchanges
//! binary frames through its own IO task. Both can run over the
//! `labwire-test-harness` mocks.
//!
//! ## Feature Flags
//!
//! | Feature    | Enables                          | Default |
//! |------------|----------------------------------|---------|
//! | `zif`      | [`zif`] module                   | yes     |
//! | `refmeter` | [`refmeter`] module              | yes     |
//! | `source`   | [`source`] module                | yes     |
//! | `probe`    | [`probe`] module                 | yes     |
//! | `full`     | All of the above                 | no      |

pub use labwire_core::*;

/// Link implementations.
pub mod transport {
    pub use labwire_transport::*;
}

/// The dispatcher for line-oriented devices.
pub mod text_io {
    pub use labwire_text_io::*;
}

/// ZIF socket controller.
///
/// Provides [`ZifController`](zif::ZifController) and
/// [`ZifBuilder`](zif::ZifBuilder) plus the binary frame codec.
#[cfg(feature = "zif")]
pub mod zif {
    pub use labwire_zif::*;
}

/// Reference meter.
///
/// Provides [`RefMeter`](refmeter::RefMeter) and
/// [`RefMeterBuilder`](refmeter::RefMeterBuilder).
#[cfg(feature = "refmeter")]
pub mod refmeter {
    pub use labwire_refmeter::*;
}

/// Programmable source.
///
/// Provides [`SourceDevice`](source::SourceDevice) and
/// [`SourceBuilder`](source::SourceBuilder). Loadpoints are validated
/// against the model limits before they are sent.
#[cfg(feature = "source")]
pub mod source {
    pub use labwire_source::*;
}

/// Network probes and the barcode reader.
#[cfg(feature = "probe")]
pub mod probe {
    pub use labwire_probe::*;
}

/// Capabilities of every source model known to the enabled backends.
///
/// ```
/// let models = labwire::supported_sources();
/// # #[cfg(feature = "source")]
/// assert!(models.iter().any(|caps| caps.model == "MT786"));
/// ```
pub fn supported_sources() -> Vec<SourceCapabilities> {
    #[allow(unused_mut)]
    let mut sources = Vec::new();

    #[cfg(feature = "source")]
    {
        sources.extend(
            source::models::all_models()
                .iter()
                .map(SourceCapabilities::from),
        );
    }

    sources
}
