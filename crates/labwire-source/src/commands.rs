//! Source request builders and loadpoint validation.
//!
//! All functions are pure. A loadpoint is programmed with four requests,
//! one per quantity, each acknowledged by its own line:
//!
//! | Command                          | Acknowledgement |
//! |----------------------------------|-----------------|
//! | `SFR<freq>`                      | `SOKFR`         |
//! | `SUP` + three phase settings     | `SOKUP`         |
//! | `SIP` + three phase settings     | `SOKIP`         |
//! | `SUI` + six on/off flags         | `SOKUI`         |
//!
//! A phase setting is `<phase>R<rms><angle>` with phase `A`, `B` or `C`,
//! `rms` as `000.000` and `angle` as `000.00`. The activation flags are
//! `E` (on) or `A` (off) for U1..U3 then I1..I3.
//!
//! Some firmware appends an echo to the acknowledgement, so the terminals
//! are prefix rules.

use labwire_core::{Error, Loadpoint, PhaseOutput, Result, SourceCapabilities, TextRequest};

const PHASE_NAMES: [char; 3] = ['A', 'B', 'C'];

/// Query model and firmware version (`AAV`).
pub fn req_version() -> TextRequest {
    TextRequest::sentinel("AAV", "AAVACK")
}

/// Set the output frequency.
///
/// ```
/// use labwire_source::commands::req_frequency;
/// assert_eq!(req_frequency(50.0).command(), "SFR50.00");
/// ```
pub fn req_frequency(frequency: f64) -> TextRequest {
    TextRequest::prefixed(format!("SFR{frequency:.2}"), "SOKFR")
}

/// Set RMS value and angle of the three voltage outputs.
pub fn req_voltages(outputs: &[PhaseOutput; 3]) -> TextRequest {
    TextRequest::prefixed(format!("SUP{}", encode_phases(outputs)), "SOKUP")
}

/// Set RMS value and angle of the three current outputs.
pub fn req_currents(outputs: &[PhaseOutput; 3]) -> TextRequest {
    TextRequest::prefixed(format!("SIP{}", encode_phases(outputs)), "SOKIP")
}

/// Switch each output on or off as the loadpoint says.
pub fn req_activation(loadpoint: &Loadpoint) -> TextRequest {
    let flags: String = loadpoint
        .voltages
        .iter()
        .chain(loadpoint.currents.iter())
        .map(|output| if output.on { 'E' } else { 'A' })
        .collect();
    TextRequest::prefixed(format!("SUI{flags}"), "SOKUI")
}

/// Switch every output off.
pub fn req_turn_off() -> TextRequest {
    TextRequest::prefixed("SUIAAAAAA", "SOKUI")
}

/// The full request batch for one loadpoint, in the order the device
/// expects: frequency, voltages, currents, activation.
pub fn loadpoint_requests(loadpoint: &Loadpoint) -> Vec<TextRequest> {
    vec![
        req_frequency(loadpoint.frequency),
        req_voltages(&loadpoint.voltages),
        req_currents(&loadpoint.currents),
        req_activation(loadpoint),
    ]
}

fn encode_phases(outputs: &[PhaseOutput; 3]) -> String {
    PHASE_NAMES
        .iter()
        .zip(outputs)
        .map(|(name, output)| format!("{name}R{:07.3}{:06.2}", output.rms, output.angle))
        .collect()
}

/// Check a loadpoint against the limits of a model.
///
/// Fails with [`Error::InvalidParameter`] naming the first offending value.
pub fn validate_loadpoint(loadpoint: &Loadpoint, caps: &SourceCapabilities) -> Result<()> {
    let f = loadpoint.frequency;
    if !(caps.min_frequency..=caps.max_frequency).contains(&f) {
        return Err(Error::InvalidParameter(format!(
            "frequency {f} Hz outside {}..{} Hz",
            caps.min_frequency, caps.max_frequency
        )));
    }

    let check = |kind: &str, outputs: &[PhaseOutput; 3], max: f64| -> Result<()> {
        for (i, output) in outputs.iter().enumerate() {
            let phase = i + 1;
            if i >= caps.phases && output.on {
                return Err(Error::InvalidParameter(format!(
                    "{kind} L{phase} cannot be enabled on a {}-phase source",
                    caps.phases
                )));
            }
            if !(0.0..=max).contains(&output.rms) {
                return Err(Error::InvalidParameter(format!(
                    "{kind} L{phase} {} outside 0..{max}",
                    output.rms
                )));
            }
            if !(0.0..360.0).contains(&output.angle) {
                return Err(Error::InvalidParameter(format!(
                    "{kind} L{phase} angle {} outside 0..360",
                    output.angle
                )));
            }
        }
        Ok(())
    };
    check("voltage", &loadpoint.voltages, caps.max_voltage)?;
    check("current", &loadpoint.currents, caps.max_current)
}
