//! Numeric knobs over the simulation parameters, addressed by JSON.

use alien_core::{ConfigError, SimulationParameters};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use smallvec::SmallVec;
use thiserror::Error;

/// Every simulation parameter is either a float or a count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KnobKind {
    Number,
    Integer,
}

/// One parameter together with its current value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnobEntry {
    pub path: String,
    pub kind: KnobKind,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnobUpdate {
    pub path: String,
    pub value: Value,
}

impl KnobUpdate {
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{0}")]
    InvalidPatch(String),
    #[error("unknown knob path: {0}")]
    UnknownPath(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Rejected(#[from] ConfigError),
}

impl From<serde_json::Error> for ControlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

type KnobPath<'a> = SmallVec<[&'a str; 4]>;

/// Current parameters as knobs, sorted by path.
pub fn list_knobs(parameters: &SimulationParameters) -> Result<Vec<KnobEntry>, ControlError> {
    let Value::Object(fields) = serde_json::to_value(parameters)? else {
        return Err(ControlError::Serialization(
            "parameters did not serialize to an object".into(),
        ));
    };
    let mut knobs: Vec<KnobEntry> = fields
        .into_iter()
        .filter(|(_, value)| value.is_number())
        .map(|(path, value)| KnobEntry {
            kind: if value.is_f64() {
                KnobKind::Number
            } else {
                KnobKind::Integer
            },
            path,
            value,
        })
        .collect();
    knobs.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(knobs)
}

/// Merge a JSON object onto `parameters` and return the validated result.
///
/// Unknown keys and non-numeric values are rejected. Numbers may also be
/// given as strings.
pub fn apply_patch(
    parameters: &SimulationParameters,
    patch: &Value,
) -> Result<SimulationParameters, ControlError> {
    if !patch.is_object() {
        return Err(ControlError::InvalidPatch(
            "parameter patch must be a JSON object".into(),
        ));
    }
    let mut value = serde_json::to_value(parameters)?;
    let mut path = KnobPath::new();
    merge_value(&mut value, patch, &mut path)?;

    let json = serde_json::to_string(&value)?;
    let mut de = serde_json::Deserializer::from_str(&json);
    let updated: SimulationParameters = serde_path_to_error::deserialize(&mut de).map_err(
        |err: serde_path_to_error::Error<serde_json::Error>| {
            ControlError::InvalidPatch(format!("{} at {}", err, err.path()))
        },
    )?;
    updated.validate()?;
    Ok(updated)
}

/// Apply knob updates by path; later updates to the same path win.
pub fn apply_updates(
    parameters: &SimulationParameters,
    updates: &[KnobUpdate],
) -> Result<SimulationParameters, ControlError> {
    let mut patch = Map::new();
    for update in updates {
        insert_path(&mut patch, &update.path, update.value.clone())?;
    }
    apply_patch(parameters, &Value::Object(patch))
}

fn insert_path(map: &mut Map<String, Value>, path: &str, value: Value) -> Result<(), ControlError> {
    let mut segments = path.split('.').filter(|segment| !segment.is_empty());
    let Some(mut segment) = segments.next() else {
        return Err(ControlError::InvalidPatch("empty knob path".into()));
    };
    let mut current = map;
    for next in segments {
        current = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| {
                ControlError::InvalidPatch(format!("segment '{segment}' is not an object"))
            })?;
        segment = next;
    }
    current.insert(segment.to_owned(), value);
    Ok(())
}

fn merge_value<'a>(
    target: &mut Value,
    patch: &'a Value,
    path: &mut KnobPath<'a>,
) -> Result<(), ControlError> {
    match patch {
        Value::Object(patch_fields) => {
            let Value::Object(fields) = target else {
                return Err(not_a_number(path));
            };
            for (key, patch_value) in patch_fields {
                path.push(key);
                let Some(field) = fields.get_mut(key) else {
                    return Err(ControlError::UnknownPath(path.join(".")));
                };
                merge_value(field, patch_value, path)?;
                path.pop();
            }
            Ok(())
        }
        Value::Number(number) if target.is_number() => {
            *target = Value::Number(number.clone());
            Ok(())
        }
        Value::String(text) if target.is_number() => {
            let number = parse_number(target, text.trim(), path)?;
            *target = Value::Number(number);
            Ok(())
        }
        _ => Err(not_a_number(path)),
    }
}

fn not_a_number(path: &[&str]) -> ControlError {
    ControlError::InvalidPatch(format!("expected a number at {}", path.join(".")))
}

/// Parse `text` as the same kind of number that `target` holds.
fn parse_number(target: &Value, text: &str, path: &[&str]) -> Result<Number, ControlError> {
    let invalid = || ControlError::InvalidPatch(format!("'{text}' at {}", path.join(".")));
    if target.is_u64() {
        return text.parse::<u64>().map(Number::from).map_err(|_| invalid());
    }
    if target.is_i64() {
        return text.parse::<i64>().map(Number::from).map_err(|_| invalid());
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn knob_update_changes_one_field() {
        let parameters = SimulationParameters::default();
        let updated = apply_updates(&parameters, &[KnobUpdate::new("cell_max_force", 0.6)])
            .expect("update");
        assert!((updated.cell_max_force - 0.6).abs() < 1e-6);
        assert_eq!(updated.cell_max_token, parameters.cell_max_token);
    }

    #[test]
    fn numeric_strings_are_parsed() {
        let updated = apply_patch(
            &SimulationParameters::default(),
            &json!({ "cell_max_token": "5", "radiation_prob": " 0.1 " }),
        )
        .expect("parsed patch");
        assert_eq!(updated.cell_max_token, 5);
        assert!((updated.radiation_prob - 0.1).abs() < 1e-6);

        let err = apply_patch(
            &SimulationParameters::default(),
            &json!({ "cell_max_token": "many" }),
        )
        .expect_err("not a number");
        assert!(matches!(err, ControlError::InvalidPatch(message) if message.contains("many")));
    }

    #[test]
    fn unknown_and_nested_paths_are_rejected() {
        let parameters = SimulationParameters::default();
        let err = apply_updates(&parameters, &[KnobUpdate::new("does.not.exist", 1)])
            .expect_err("unknown path");
        assert!(matches!(err, ControlError::UnknownPath(path) if path == "does"));

        let err = apply_updates(&parameters, &[KnobUpdate::new("cell_max_force.inner", 1)])
            .expect_err("numbers have no fields");
        assert!(matches!(err, ControlError::InvalidPatch(_)));

        let err = apply_updates(&parameters, &[KnobUpdate::new("", 1)]).expect_err("empty");
        assert!(matches!(err, ControlError::InvalidPatch(_)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let parameters = SimulationParameters::default();
        let err = apply_patch(&parameters, &json!({ "radiation_prob": 2.0 }))
            .expect_err("probability above one");
        assert!(matches!(err, ControlError::Rejected(_)));

        let err = apply_patch(&parameters, &json!({ "cell_max_token": -1 }))
            .expect_err("negative count");
        assert!(matches!(err, ControlError::InvalidPatch(message) if message.contains("cell_max_token")));

        let err = apply_patch(&parameters, &json!({ "cell_max_force": true }))
            .expect_err("boolean for a float");
        assert!(matches!(err, ControlError::InvalidPatch(_)));

        let err = apply_patch(&parameters, &json!([1, 2])).expect_err("not an object");
        assert!(matches!(err, ControlError::InvalidPatch(_)));
    }

    #[test]
    fn knobs_cover_every_parameter() {
        let knobs = list_knobs(&SimulationParameters::default()).expect("knobs");
        assert_eq!(knobs.len(), 16);
        assert!(knobs.windows(2).all(|pair| pair[0].path < pair[1].path));
        let kind_of = |path: &str| {
            knobs
                .iter()
                .find(|knob| knob.path == path)
                .map(|knob| knob.kind)
        };
        assert_eq!(kind_of("cell_max_force"), Some(KnobKind::Number));
        assert_eq!(kind_of("cell_max_token"), Some(KnobKind::Integer));
    }
}
