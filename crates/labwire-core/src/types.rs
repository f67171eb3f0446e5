//! Domain value types shared by the instrument adapters.
//!
//! These are the parsed results of device exchanges. They carry no
//! connection state and derive `Serialize` so a web layer can return them
//! as they are.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// Model name and firmware version reported by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceVersion {
    /// Model identifier, e.g. `MT786`.
    pub model_name: String,
    /// Firmware version, e.g. `06.27`.
    pub version: String,
}

impl DeviceVersion {
    /// Build a version from its parts.
    pub fn new(model_name: impl Into<String>, version: impl Into<String>) -> Self {
        DeviceVersion {
            model_name: model_name.into(),
            version: version.into(),
        }
    }

    /// Parse a `<model>V<version>` line as sent in reply to `AAV`.
    ///
    /// Equivalent to matching `^(.+)V([^V]+)$`: the split happens at the
    /// last `V`, so model names that themselves contain a `V` are kept
    /// intact, and both halves must be non-empty.
    pub fn parse(line: &str) -> Result<Self> {
        let malformed = || Error::Protocol(format!("malformed version line: {line:?}"));
        let (model, version) = line.trim().rsplit_once('V').ok_or_else(malformed)?;
        if model.is_empty() || version.is_empty() {
            return Err(malformed());
        }
        Ok(DeviceVersion::new(model.trim(), version.trim()))
    }
}

impl fmt::Display for DeviceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.model_name, self.version)
    }
}

/// Outcome of an availability probe.
///
/// Probes never fail: any error is folded into `successful == false` with
/// the error message as detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    /// Whether the device answered as expected.
    pub successful: bool,
    /// Version string on success, error message on failure.
    pub detail: String,
}

impl ProbeResult {
    /// A successful probe.
    pub fn success(detail: impl Into<String>) -> Self {
        ProbeResult {
            successful: true,
            detail: detail.into(),
        }
    }

    /// An unsuccessful probe caused by `err`.
    pub fn failure(err: &Error) -> Self {
        ProbeResult {
            successful: false,
            detail: err.to_string(),
        }
    }
}

/// Measurement mode of a reference meter.
///
/// The wire codes live with the reference meter adapter; this enum is the
/// device-independent name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MeasurementMode {
    TwoWireActivePower,
    TwoWireReactivePower,
    TwoWireApparentPower,
    ThreeWireActivePower,
    ThreeWireReactivePower,
    ThreeWireApparentPower,
    ThreeWireReactivePowerCrossConnected,
    FourWireActivePower,
    FourWireReactivePower,
    FourWireApparentPower,
    FourWireReactivePowerCrossConnected,
    MqBase,
}

impl fmt::Display for MeasurementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Three values, one per phase (L1, L2, L3).
pub type PerPhase = [f64; 3];

/// One snapshot of reference meter readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasuredValues {
    /// RMS voltages in volts.
    pub voltages: PerPhase,
    /// RMS currents in amperes.
    pub currents: PerPhase,
    /// Voltage phase angles in degrees.
    pub voltage_angles: PerPhase,
    /// Current phase angles in degrees.
    pub current_angles: PerPhase,
    /// Active power per phase in watts.
    pub active_power: PerPhase,
    /// Reactive power per phase in var.
    pub reactive_power: PerPhase,
    /// Apparent power per phase in VA.
    pub apparent_power: PerPhase,
    /// Sum of active power.
    pub total_active_power: f64,
    /// Sum of reactive power.
    pub total_reactive_power: f64,
    /// Sum of apparent power.
    pub total_apparent_power: f64,
    /// Line frequency in hertz.
    pub frequency: f64,
}

/// Output setting of one source phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseOutput {
    /// RMS value (volts or amperes).
    pub rms: f64,
    /// Phase angle in degrees, `0.0..360.0`.
    pub angle: f64,
    /// Whether the output is switched on.
    pub on: bool,
}

impl PhaseOutput {
    /// An enabled output.
    pub fn on(rms: f64, angle: f64) -> Self {
        PhaseOutput {
            rms,
            angle,
            on: true,
        }
    }
}

/// A complete loadpoint: frequency plus voltage and current per phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Loadpoint {
    /// Output frequency in hertz.
    pub frequency: f64,
    /// Voltage outputs L1..L3.
    pub voltages: [PhaseOutput; 3],
    /// Current outputs L1..L3.
    pub currents: [PhaseOutput; 3],
}

/// Static limits of a source model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCapabilities {
    /// Model name as reported by the device.
    pub model: String,
    /// Number of phases the source can drive.
    pub phases: usize,
    /// Highest programmable voltage in volts.
    pub max_voltage: f64,
    /// Highest programmable current in amperes.
    pub max_current: f64,
    /// Lowest programmable frequency in hertz.
    pub min_frequency: f64,
    /// Highest programmable frequency in hertz.
    pub max_frequency: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_version_line() {
        let v = DeviceVersion::parse("MT786V06.27").unwrap();
        assert_eq!(v.model_name, "MT786");
        assert_eq!(v.version, "06.27");
    }

    #[test]
    fn parse_version_splits_at_last_v() {
        let v = DeviceVersion::parse("EPZ303-VX V2.11").unwrap();
        assert_eq!(v.model_name, "EPZ303-VX");
        assert_eq!(v.version, "2.11");
    }

    #[test]
    fn parse_version_rejects_line_without_v() {
        assert!(matches!(
            DeviceVersion::parse("garbage"),
            Err(Error::Protocol(_))
        ));
        assert!(DeviceVersion::parse("MT786V").is_err());
    }

    #[test]
    fn probe_result_from_error() {
        let p = ProbeResult::failure(&Error::Nak);
        assert!(!p.successful);
        assert_eq!(p.detail, "device returned NAK");
    }

    #[test]
    fn version_serializes_camel_case() {
        let json = serde_json::to_value(DeviceVersion::new("FG301", "1.04")).unwrap();
        assert_eq!(json["modelName"], "FG301");
        assert_eq!(json["version"], "1.04");
    }
}
