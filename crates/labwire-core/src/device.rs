//! Device-family traits.
//!
//! Each instrument family gets one trait. Applications program against
//! `dyn ReferenceMeter`, `dyn Source` or `dyn ZifSocket` without knowing
//! which protocol adapter sits behind it, and tests can substitute fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::*;

/// A reference meter: the measurement standard of a test bench.
#[async_trait]
pub trait ReferenceMeter: Send + Sync {
    /// Query model name and firmware version.
    async fn version(&self) -> Result<DeviceVersion>;

    /// Read one snapshot of all measured quantities.
    async fn measure(&self) -> Result<MeasuredValues>;

    /// Query the measurement modes the device supports.
    ///
    /// Codes the adapter does not know are skipped.
    async fn supported_measurement_modes(&self) -> Result<Vec<MeasurementMode>>;

    /// Switch the device to `mode`.
    async fn set_actual_measurement_mode(&self, mode: MeasurementMode) -> Result<()>;

    /// The mode most recently set through this adapter.
    ///
    /// The device has no query for its active mode, so this is assumed
    /// state: `None` until [`set_actual_measurement_mode`] succeeded once.
    ///
    /// [`set_actual_measurement_mode`]: ReferenceMeter::set_actual_measurement_mode
    fn actual_measurement_mode(&self) -> Option<MeasurementMode>;
}

/// A programmable voltage/current source.
#[async_trait]
pub trait Source: Send + Sync {
    /// Query model name and firmware version.
    async fn version(&self) -> Result<DeviceVersion>;

    /// Limits of the connected model.
    async fn capabilities(&self) -> Result<SourceCapabilities>;

    /// Program frequency, voltages, currents and output activation.
    async fn set_loadpoint(&self, loadpoint: &Loadpoint) -> Result<()>;

    /// The loadpoint most recently programmed through this adapter.
    fn current_loadpoint(&self) -> Option<Loadpoint>;

    /// Switch every output off.
    async fn turn_off(&self) -> Result<()>;
}

/// A ZIF socket controller.
#[async_trait]
pub trait ZifSocket: Send + Sync {
    /// Firmware version as `"{major}.{minor}"`.
    async fn version(&self) -> Result<String>;

    /// Controller serial number.
    async fn serial_number(&self) -> Result<u32>;

    /// Switch a socket's contacts on or off.
    async fn set_active(&self, socket: u8, on: bool) -> Result<()>;

    /// Check whether a controller answers on the link.
    async fn probe(&self) -> ProbeResult {
        match self.version().await {
            Ok(v) => ProbeResult::success(v),
            Err(e) => ProbeResult::failure(&e),
        }
    }
}
