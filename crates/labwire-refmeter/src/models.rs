//! Measurement mode codes.
//!
//! Reference meters name their measurement modes with short codes: the
//! wire count (`2L`, `3L`, `4L`), then the quantity (`W` active, `B`
//! reactive, `S` apparent), with a trailing `E` for the cross-connected
//! reactive variants. `MQBase` is the meter's base measuring quantity mode.
//!
//! | Code     | Mode                                   |
//! |----------|----------------------------------------|
//! | `2LW`    | `TwoWireActivePower`                   |
//! | `2LB`    | `TwoWireReactivePower`                 |
//! | `2LS`    | `TwoWireApparentPower`                 |
//! | `3LW`    | `ThreeWireActivePower`                 |
//! | `3LB`    | `ThreeWireReactivePower`               |
//! | `3LS`    | `ThreeWireApparentPower`               |
//! | `3LBE`   | `ThreeWireReactivePowerCrossConnected` |
//! | `4LW`    | `FourWireActivePower`                  |
//! | `4LB`    | `FourWireReactivePower`                |
//! | `4LS`    | `FourWireApparentPower`                |
//! | `4LBE`   | `FourWireReactivePowerCrossConnected`  |
//! | `MQBase` | `MqBase`                               |
//!
//! The table is small, so both directions are a linear scan.

use labwire_core::MeasurementMode;

static MODE_CODES: [(&str, MeasurementMode); 12] = [
    ("2LW", MeasurementMode::TwoWireActivePower),
    ("2LB", MeasurementMode::TwoWireReactivePower),
    ("2LS", MeasurementMode::TwoWireApparentPower),
    ("3LW", MeasurementMode::ThreeWireActivePower),
    ("3LB", MeasurementMode::ThreeWireReactivePower),
    ("3LS", MeasurementMode::ThreeWireApparentPower),
    ("3LBE", MeasurementMode::ThreeWireReactivePowerCrossConnected),
    ("4LW", MeasurementMode::FourWireActivePower),
    ("4LB", MeasurementMode::FourWireReactivePower),
    ("4LS", MeasurementMode::FourWireApparentPower),
    ("4LBE", MeasurementMode::FourWireReactivePowerCrossConnected),
    ("MQBase", MeasurementMode::MqBase),
];

/// Look up the mode for a device code. Codes are case-sensitive.
pub fn mode_from_code(code: &str) -> Option<MeasurementMode> {
    MODE_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, mode)| *mode)
}

/// Look up the device code for a mode.
pub fn code_for_mode(mode: MeasurementMode) -> Option<&'static str> {
    MODE_CODES
        .iter()
        .find(|(_, m)| *m == mode)
        .map(|(code, _)| *code)
}

/// Every mode the adapter knows a code for, in table order.
pub fn known_modes() -> impl Iterator<Item = MeasurementMode> {
    MODE_CODES.iter().map(|(_, mode)| *mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_both_directions() {
        assert_eq!(
            mode_from_code("3LW"),
            Some(MeasurementMode::ThreeWireActivePower)
        );
        assert_eq!(
            code_for_mode(MeasurementMode::FourWireReactivePowerCrossConnected),
            Some("4LBE")
        );
    }

    #[test]
    fn unknown_code() {
        assert_eq!(mode_from_code("5LW"), None);
        assert_eq!(mode_from_code("3lw"), None);
        assert_eq!(mode_from_code(""), None);
    }

    #[test]
    fn table_round_trips() {
        for mode in known_modes() {
            let code = code_for_mode(mode).unwrap();
            assert_eq!(mode_from_code(code), Some(mode));
        }
        assert_eq!(known_modes().count(), 12);
    }
}
