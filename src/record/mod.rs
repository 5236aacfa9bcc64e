//! Canonical measurement records: arithmetic, serialization and
//! structural dump/parse over a plain nested mapping.

pub mod list;
pub mod path;
pub mod types;

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ParsingError;

/// Rounds a percentage-ish value to 3 decimal places, the precision
/// every record constructor applies at ingestion time.
pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Removes `exclude`d keys from a JSON value, recursing into nested
/// mappings and sequences. Mirrors the Python source's recursive
/// `model_dump(exclude=...)` behavior, with `exclude` as a genuine set
/// of keys rather than a single string (§9 open question).
pub fn apply_exclude(value: &mut serde_json::Value, exclude: &HashSet<String>) {
    match value {
        serde_json::Value::Object(map) => {
            map.retain(|k, _| !exclude.contains(k));
            for v in map.values_mut() {
                apply_exclude(v, exclude);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items.iter_mut() {
                apply_exclude(v, exclude);
            }
        }
        _ => {}
    }
}

/// A measurement record: convertible to/from a plain nested mapping,
/// immutable after construction.
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Dumps the record to a JSON-like nested mapping, applying
    /// `exclude` recursively.
    fn model_dump(&self, exclude: &HashSet<String>) -> serde_json::Value {
        let mut value = serde_json::to_value(self).expect("record always serializes");
        apply_exclude(&mut value, exclude);
        value
    }

    /// Parses a record back from the nested mapping produced by
    /// [`Record::model_dump`] (with no keys excluded).
    fn from_mapping(value: serde_json::Value) -> Result<Self, ParsingError> {
        serde_json::from_value(value.clone())
            .map_err(|e| ParsingError::new(format!("record decode: {e}"), value.to_string()))
    }

    /// Dumps to compact JSON text.
    fn dump_json(&self, exclude: &HashSet<String>) -> String {
        self.model_dump(exclude).to_string()
    }

    /// Parses from JSON text.
    fn parse_json(text: &str) -> Result<Self, ParsingError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ParsingError::new(format!("json decode: {e}"), text.to_string()))?;
        Self::from_mapping(value)
    }

    /// Dumps to the indentation-based tag-delimited form used by the
    /// log/dump convenience surface (§6).
    fn dump_indented(&self, exclude: &HashSet<String>) -> String {
        let value = self.model_dump(exclude);
        let mut out = String::new();
        write_indented(&value, 0, &mut out);
        out
    }
}

fn write_indented(value: &serde_json::Value, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                match v {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        out.push_str(&format!("{pad}{k}:\n"));
                        write_indented(v, depth + 1, out);
                    }
                    _ => out.push_str(&format!("{pad}{k}: {}\n", scalar_text(v))),
                }
            }
        }
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                match v {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        out.push_str(&format!("{pad}- [{i}]\n"));
                        write_indented(v, depth + 1, out);
                    }
                    _ => out.push_str(&format!("{pad}- {}\n", scalar_text(v))),
                }
            }
        }
        other => out.push_str(&format!("{pad}{}\n", scalar_text(other))),
    }
}

fn scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Element-wise addition and scalar division for record arithmetic.
/// Implemented per concrete record type, matching the source's
/// `__add__`/`__truediv__` dunder methods.
pub trait Arithmetic: Sized {
    fn add(&self, other: &Self) -> Self;
    fn div_scalar(&self, scalar: f64) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
    struct Dummy {
        a: i64,
        timestamp: String,
        nested: DummyNested,
    }

    #[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
    struct DummyNested {
        b: f64,
        timestamp: String,
    }

    impl Record for Dummy {}

    #[test]
    fn round_trip_dump_parse() {
        let r = Dummy {
            a: 5,
            timestamp: "2024-01-01T00:00:00Z".into(),
            nested: DummyNested {
                b: 1.5,
                timestamp: "2024-01-01T00:00:00Z".into(),
            },
        };
        let dumped = r.model_dump(&HashSet::new());
        let parsed = Dummy::from_mapping(dumped.clone()).unwrap();
        assert_eq!(parsed.model_dump(&HashSet::new()), dumped);
    }

    #[test]
    fn exclude_recurses_into_nested_mappings() {
        let r = Dummy {
            a: 5,
            timestamp: "2024-01-01T00:00:00Z".into(),
            nested: DummyNested {
                b: 1.5,
                timestamp: "2024-01-01T00:00:00Z".into(),
            },
        };
        let mut exclude = HashSet::new();
        exclude.insert("timestamp".to_string());
        let dumped = r.model_dump(&exclude);
        assert!(dumped.get("timestamp").is_none());
        assert!(dumped["nested"].get("timestamp").is_none());
        assert_eq!(dumped["nested"]["b"], 1.5);
    }

    #[test]
    fn round3_rounds_to_three_decimals() {
        assert_eq!(round3(1.23456), 1.235);
        assert_eq!(round3(100.0), 100.0);
    }
}
