//! Reference meter request builders and reply parsers.
//!
//! All functions are pure -- they produce [`TextRequest`]s or consume
//! [`Reply`]s without performing any I/O. The caller submits the requests
//! to a [`Dispatcher`](labwire_core::Dispatcher) and feeds the replies back
//! into the parsers.
//!
//! # Command reference
//!
//! | Command      | Reply                                  | Terminal            |
//! |--------------|----------------------------------------|---------------------|
//! | `AAV`        | `<model>V<version>`                    | `AAVACK`            |
//! | `AME`        | one `<index>;<value>` line per reading | `AMEACK`            |
//! | `MI`         | `MI<code>;<code>;...`                  | `^MI([^;]+;)*$`     |
//! | `MA<code>`   | none                                   | `OKMA`              |

use tracing::debug;

use labwire_core::{DeviceVersion, Error, MeasuredValues, MeasurementMode, Reply, Result, TextRequest};

use crate::models;

/// Terminal pattern of the `MI` reply.
pub const MODES_PATTERN: &str = r"^MI([^;]+;)*$";

// ---------------------------------------------------------------
// Request builders
// ---------------------------------------------------------------

/// Query model and firmware version (`AAV`).
pub fn req_version() -> TextRequest {
    TextRequest::sentinel("AAV", "AAVACK")
}

/// Read all measured values (`AME`).
pub fn req_measure() -> TextRequest {
    TextRequest::sentinel("AME", "AMEACK")
}

/// List supported measurement modes (`MI`).
pub fn req_measurement_modes() -> Result<TextRequest> {
    TextRequest::pattern("MI", MODES_PATTERN)
}

/// Select a measurement mode (`MA<code>`).
pub fn req_set_measurement_mode(code: &str) -> TextRequest {
    TextRequest::sentinel(format!("MA{code}"), "OKMA")
}

// ---------------------------------------------------------------
// Reply parsers
// ---------------------------------------------------------------

/// Parse the `AAV` reply: the version line precedes the `AAVACK` terminal.
pub fn parse_version(reply: &Reply) -> Result<DeviceVersion> {
    let line = reply
        .body()
        .last()
        .ok_or_else(|| Error::Protocol("AAV reply carries no version line".into()))?;
    DeviceVersion::parse(line)
}

/// Parse the `MI` reply into the modes this adapter knows.
///
/// Only the terminal line carries the mode list; anything accumulated
/// before it is noise. Codes without a table entry are skipped.
pub fn parse_measurement_modes(reply: &Reply) -> Result<Vec<MeasurementMode>> {
    let line = reply
        .terminal_line()
        .ok_or_else(|| Error::Protocol("empty MI reply".into()))?;
    let list = line
        .strip_prefix("MI")
        .ok_or_else(|| Error::Protocol(format!("malformed MI reply: {line:?}")))?;

    let mut modes = Vec::new();
    for code in list.split(';').filter(|c| !c.is_empty()) {
        match models::mode_from_code(code) {
            Some(mode) => modes.push(mode),
            None => debug!(code = %code, "skipping unsupported measurement mode"),
        }
    }
    Ok(modes)
}

/// Parse the `AME` reply.
///
/// Each body line is `<index>;<value>`. Indices:
///
/// | Index   | Quantity                       |
/// |---------|--------------------------------|
/// | 0..=2   | voltage L1..L3                 |
/// | 3..=5   | current L1..L3                 |
/// | 6..=8   | voltage angle L1..L3           |
/// | 9..=11  | current angle L1..L3           |
/// | 12..=14 | active power L1..L3            |
/// | 15..=17 | reactive power L1..L3          |
/// | 18..=20 | apparent power L1..L3          |
/// | 21      | total active power             |
/// | 22      | total reactive power           |
/// | 23      | total apparent power           |
/// | 24      | frequency                      |
///
/// Unknown indices are ignored; a line that is not `<index>;<number>` is a
/// protocol error.
pub fn parse_measurement(reply: &Reply) -> Result<MeasuredValues> {
    let mut values = MeasuredValues::default();
    for line in reply.body() {
        let (index, value) = parse_indexed_value(line)?;
        let slot = match index {
            0..=2 => &mut values.voltages[index],
            3..=5 => &mut values.currents[index - 3],
            6..=8 => &mut values.voltage_angles[index - 6],
            9..=11 => &mut values.current_angles[index - 9],
            12..=14 => &mut values.active_power[index - 12],
            15..=17 => &mut values.reactive_power[index - 15],
            18..=20 => &mut values.apparent_power[index - 18],
            21 => &mut values.total_active_power,
            22 => &mut values.total_reactive_power,
            23 => &mut values.total_apparent_power,
            24 => &mut values.frequency,
            _ => {
                debug!(index, "ignoring unknown measurement index");
                continue;
            }
        };
        *slot = value;
    }
    Ok(values)
}

fn parse_indexed_value(line: &str) -> Result<(usize, f64)> {
    let malformed = || Error::Protocol(format!("malformed measurement line: {line:?}"));
    let (index, value) = line.split_once(';').ok_or_else(malformed)?;
    let index = index.trim().parse().map_err(|_| malformed())?;
    let value = value
        .trim()
        .trim_end_matches(';')
        .parse()
        .map_err(|_| malformed())?;
    Ok((index, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(lines: &[&str]) -> Reply {
        Reply::new(lines.iter().map(|l| l.to_string()).collect())
    }

    #[test]
    fn requests_carry_their_terminals() {
        assert_eq!(req_version().command(), "AAV");
        assert!(req_version().terminal().matches("AAVACK"));
        assert!(req_measure().terminal().matches("AMEACK"));
        let set = req_set_measurement_mode("4LBE");
        assert_eq!(set.command(), "MA4LBE");
        assert!(set.terminal().matches("OKMA"));
    }

    #[test]
    fn modes_terminal_pattern() {
        let request = req_measurement_modes().unwrap();
        assert!(request.terminal().matches("MI3LW;MQBase;"));
        assert!(request.terminal().matches("MI"));
        assert!(!request.terminal().matches("MIxxx"));
    }

    #[test]
    fn parse_version_line() {
        let v = parse_version(&reply(&["MT786V06.27", "AAVACK"])).unwrap();
        assert_eq!(v.model_name, "MT786");
        assert_eq!(v.version, "06.27");
    }

    #[test]
    fn parse_version_without_body() {
        assert!(matches!(
            parse_version(&reply(&["AAVACK"])),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn parse_modes_skips_noise_and_unknown_codes() {
        let modes =
            parse_measurement_modes(&reply(&["MIxxx", "ERR", "junk", "MI3LW;4LX;MQBase;"]))
                .unwrap();
        assert_eq!(
            modes,
            vec![MeasurementMode::ThreeWireActivePower, MeasurementMode::MqBase]
        );
    }

    #[test]
    fn parse_empty_mode_list() {
        assert!(parse_measurement_modes(&reply(&["MI"])).unwrap().is_empty());
    }

    #[test]
    fn parse_measurement_lines() {
        let values = parse_measurement(&reply(&[
            "0;230.1",
            "1;230.2",
            "2;229.9",
            "4;5.0",
            "7;120.0",
            "11;240.5",
            "21;3450.0",
            "24;50.01",
            "99;1.0",
            "AMEACK",
        ]))
        .unwrap();
        assert_eq!(values.voltages, [230.1, 230.2, 229.9]);
        assert_eq!(values.currents[1], 5.0);
        assert_eq!(values.voltage_angles[1], 120.0);
        assert_eq!(values.current_angles[2], 240.5);
        assert_eq!(values.total_active_power, 3450.0);
        assert_eq!(values.frequency, 50.01);
        assert_eq!(values.apparent_power, [0.0; 3]);
    }

    #[test]
    fn parse_measurement_rejects_malformed_line() {
        let result = parse_measurement(&reply(&["0;230.1", "garbage", "AMEACK"]));
        assert!(matches!(result, Err(Error::Protocol(_))));
        let result = parse_measurement(&reply(&["x;1.0", "AMEACK"]));
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
