//! labwire-probe: network version probes and the barcode reader.
//!
//! These adapters sit beside the instrument families rather than on a
//! dispatcher of their own:
//!
//! - [`ErrorCalculator`] runs the `AAV` version exchange over a raw TCP
//!   command port.
//! - [`HttpVersionProbe`] reads `GET <endpoint>/Version/0` from an
//!   instrument's HTTP service.
//! - [`BarcodeReader`] turns scanner output into
//!   [`DeviceEvent::BarcodeScanned`](labwire_core::DeviceEvent::BarcodeScanned)
//!   events.
//!
//! # Example
//!
//! ```no_run
//! use labwire_probe::ErrorCalculator;
//!
//! # async fn example() -> labwire_core::Result<()> {
//! let mut calc = ErrorCalculator::new();
//! calc.initialize("bench-1", "192.168.1.40:14207", 1000, 2000).await?;
//! let result = calc.probe().await;
//! println!("{}: {}", result.successful, result.detail);
//! # Ok(())
//! # }
//! ```

pub mod barcode;
pub mod errcalc;
pub mod http;

pub use barcode::BarcodeReader;
pub use errcalc::ErrorCalculator;
pub use http::HttpVersionProbe;
