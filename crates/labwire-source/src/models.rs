//! Source model definitions.
//!
//! Each supported source is described by a [`SourceModel`] with its output
//! limits. The adapter looks the model up by the name the device reports in
//! its version reply and validates every loadpoint against it.
//!
//! | Model  | Phases | Max U  | Max I  | Frequency   |
//! |--------|--------|--------|--------|-------------|
//! | FG30x  | 3      | 300 V  | 120 A  | 45..65 Hz   |
//! | MT786  | 3      | 500 V  | 100 A  | 40..70 Hz   |
//! | MT3000 | 3      | 480 V  | 160 A  | 15..70 Hz   |
//!
//! The FG30x family reports individual names (`FG301`, `FG302`, ...); all of
//! them share one entry.

use labwire_core::{Error, Result, SourceCapabilities};

/// Static limits of one source model.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceModel {
    /// Model name (e.g. "MT786").
    pub name: &'static str,
    pub phases: usize,
    /// Highest programmable voltage in volts.
    pub max_voltage: f64,
    /// Highest programmable current in amperes.
    pub max_current: f64,
    pub min_frequency: f64,
    pub max_frequency: f64,
}

impl From<&SourceModel> for SourceCapabilities {
    fn from(model: &SourceModel) -> Self {
        SourceCapabilities {
            model: model.name.to_string(),
            phases: model.phases,
            max_voltage: model.max_voltage,
            max_current: model.max_current,
            min_frequency: model.min_frequency,
            max_frequency: model.max_frequency,
        }
    }
}

/// FG30x family.
pub fn fg30x() -> SourceModel {
    SourceModel {
        name: "FG30x",
        phases: 3,
        max_voltage: 300.0,
        max_current: 120.0,
        min_frequency: 45.0,
        max_frequency: 65.0,
    }
}

/// MT786 portable source.
pub fn mt786() -> SourceModel {
    SourceModel {
        name: "MT786",
        phases: 3,
        max_voltage: 500.0,
        max_current: 100.0,
        min_frequency: 40.0,
        max_frequency: 70.0,
    }
}

/// MT3000 stationary source.
pub fn mt3000() -> SourceModel {
    SourceModel {
        name: "MT3000",
        phases: 3,
        max_voltage: 480.0,
        max_current: 160.0,
        min_frequency: 15.0,
        max_frequency: 70.0,
    }
}

/// Every supported model.
pub fn all_models() -> Vec<SourceModel> {
    vec![fg30x(), mt786(), mt3000()]
}

/// Look up the model entry for a reported model name.
pub fn model_for(name: &str) -> Option<SourceModel> {
    let name = name.trim();
    if name.starts_with("FG30") {
        return Some(fg30x());
    }
    all_models().into_iter().find(|m| m.name == name)
}

/// Capabilities of the model named `name`.
///
/// Fails with [`Error::UnsupportedModel`] for names without an entry.
pub fn capabilities_for(name: &str) -> Result<SourceCapabilities> {
    model_for(name)
        .map(|model| SourceCapabilities::from(&model))
        .ok_or_else(|| Error::UnsupportedModel(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_models() {
        assert_eq!(capabilities_for("MT786").unwrap().max_voltage, 500.0);
        assert_eq!(capabilities_for("MT3000").unwrap().max_current, 160.0);
        assert_eq!(capabilities_for("FG30x").unwrap().model, "FG30x");
    }

    #[test]
    fn fg30_family_shares_entry() {
        assert_eq!(
            capabilities_for("FG301").unwrap(),
            capabilities_for("FG302").unwrap()
        );
    }

    #[test]
    fn lookup_is_idempotent() {
        let first = capabilities_for("MT786").unwrap();
        let second = capabilities_for("MT786").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_model_always_fails_the_same_way() {
        for _ in 0..2 {
            match capabilities_for("XY9") {
                Err(Error::UnsupportedModel(name)) => assert_eq!(name, "XY9"),
                other => panic!("expected UnsupportedModel, got: {other:?}"),
            }
        }
    }

    #[test]
    fn model_names_are_unique() {
        let models = all_models();
        for (i, a) in models.iter().enumerate() {
            for b in &models[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }
}
