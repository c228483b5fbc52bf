//! Filter evaluation for the in-memory backend.
//!
//! A filter maps field paths (dot-separated for nested objects) to either a
//! plain value (equality) or an operator object such as
//! `{"$gte": 10, "$lt": 20}`. All listed fields must match.

use std::cmp::Ordering;

use serde_json::Value as JsonValue;

use super::TransportResult;
use super::sort::compare_values;
use crate::core::{Filters, Record, TransportError};

/// Resolve a dot-separated path inside a record.
pub fn lookup_path<'a>(record: &'a Record, path: &str) -> Option<&'a JsonValue> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Eq(JsonValue),
    Ne(JsonValue),
    Gt(JsonValue),
    Gte(JsonValue),
    Lt(JsonValue),
    Lte(JsonValue),
    In(Vec<JsonValue>),
    Nin(Vec<JsonValue>),
    Exists(bool),
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    path: String,
    predicate: Predicate,
}

/// Filters compiled into a list of conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    conditions: Vec<Condition>,
}

impl CompiledFilter {
    /// Validate and compile `filters`; unknown operators are rejected.
    pub fn compile(filters: &Filters) -> TransportResult<Self> {
        let mut conditions = Vec::new();
        for (path, constraint) in filters.iter() {
            if path.starts_with('$') {
                return Err(TransportError::Rejected(format!(
                    "unsupported top-level operator '{path}'"
                )));
            }
            match constraint {
                JsonValue::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
                    for (op, operand) in ops {
                        conditions.push(Condition {
                            path: path.clone(),
                            predicate: parse_operator(path, op, operand)?,
                        });
                    }
                }
                other => conditions.push(Condition {
                    path: path.clone(),
                    predicate: Predicate::Eq(other.clone()),
                }),
            }
        }
        Ok(Self { conditions })
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|condition| {
            let value = lookup_path(record, &condition.path);
            condition.predicate.test(value)
        })
    }
}

fn parse_operator(path: &str, op: &str, operand: &JsonValue) -> TransportResult<Predicate> {
    let list = |operand: &JsonValue| match operand {
        JsonValue::Array(items) => Ok(items.clone()),
        _ => Err(TransportError::Rejected(format!(
            "'{op}' on '{path}' expects an array"
        ))),
    };

    Ok(match op {
        "$eq" => Predicate::Eq(operand.clone()),
        "$ne" => Predicate::Ne(operand.clone()),
        "$gt" => Predicate::Gt(operand.clone()),
        "$gte" => Predicate::Gte(operand.clone()),
        "$lt" => Predicate::Lt(operand.clone()),
        "$lte" => Predicate::Lte(operand.clone()),
        "$in" => Predicate::In(list(operand)?),
        "$nin" => Predicate::Nin(list(operand)?),
        "$exists" => match operand {
            JsonValue::Bool(b) => Predicate::Exists(*b),
            _ => {
                return Err(TransportError::Rejected(format!(
                    "'$exists' on '{path}' expects a boolean"
                )));
            }
        },
        _ => {
            return Err(TransportError::Rejected(format!(
                "unsupported operator '{op}' on '{path}'"
            )));
        }
    })
}

fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(_), JsonValue::Number(_)) => compare_values(a, b) == Ordering::Equal,
        _ => a == b,
    }
}

/// Equality, where an array field also matches any of its elements.
fn field_equals(field: Option<&JsonValue>, target: &JsonValue) -> bool {
    match field {
        None | Some(JsonValue::Null) => target.is_null(),
        Some(JsonValue::Array(items)) if !target.is_array() => {
            items.iter().any(|item| values_equal(item, target))
        }
        Some(value) => values_equal(value, target),
    }
}

/// Range comparison; only values of the same JSON type compare.
fn field_compares(field: Option<&JsonValue>, target: &JsonValue, accept: fn(Ordering) -> bool) -> bool {
    match field {
        Some(value) if std::mem::discriminant(value) == std::mem::discriminant(target) => {
            accept(compare_values(value, target))
        }
        _ => false,
    }
}

impl Predicate {
    fn test(&self, field: Option<&JsonValue>) -> bool {
        match self {
            Self::Eq(target) => field_equals(field, target),
            Self::Ne(target) => !field_equals(field, target),
            Self::Gt(target) => field_compares(field, target, Ordering::is_gt),
            Self::Gte(target) => field_compares(field, target, Ordering::is_ge),
            Self::Lt(target) => field_compares(field, target, Ordering::is_lt),
            Self::Lte(target) => field_compares(field, target, Ordering::is_le),
            Self::In(targets) => targets.iter().any(|t| field_equals(field, t)),
            Self::Nin(targets) => !targets.iter().any(|t| field_equals(field, t)),
            Self::Exists(expected) => field.is_some() == *expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: JsonValue) -> Record {
        value.as_object().unwrap().clone()
    }

    fn matches(filters: JsonValue, rec: JsonValue) -> bool {
        CompiledFilter::compile(&Filters::from(filters))
            .unwrap()
            .matches(&record(rec))
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(matches(json!({}), json!({"id": 1})));
    }

    #[test]
    fn test_equality_and_arrays() {
        assert!(matches(json!({"status": "active"}), json!({"status": "active"})));
        assert!(!matches(json!({"status": "active"}), json!({"status": "closed"})));
        assert!(matches(json!({"tags": "red"}), json!({"tags": ["blue", "red"]})));
        assert!(matches(json!({"deleted": null}), json!({"id": 1})));
        assert!(matches(json!({"n": 1}), json!({"n": 1.0})));
    }

    #[test]
    fn test_range_operators() {
        let filter = json!({"age": {"$gte": 18, "$lt": 65}});
        assert!(matches(filter.clone(), json!({"age": 18})));
        assert!(!matches(filter.clone(), json!({"age": 65})));
        assert!(!matches(filter.clone(), json!({"age": "30"})));
        assert!(!matches(filter, json!({})));
    }

    #[test]
    fn test_membership_and_existence() {
        assert!(matches(json!({"c": {"$in": ["x", "y"]}}), json!({"c": "y"})));
        assert!(matches(json!({"c": {"$nin": ["x"]}}), json!({"c": "y"})));
        assert!(matches(json!({"c": {"$exists": false}}), json!({"d": 1})));
        assert!(matches(json!({"c": {"$ne": "x"}}), json!({})));
    }

    #[test]
    fn test_nested_paths() {
        assert!(matches(
            json!({"owner.name": "ada"}),
            json!({"owner": {"name": "ada"}})
        ));
        assert!(matches(json!({"items.1": 7}), json!({"items": [3, 7]})));
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let err = CompiledFilter::compile(&Filters::from(json!({"a": {"$regex": "x"}}))).unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));

        let err = CompiledFilter::compile(&Filters::from(json!({"$where": "1"}))).unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));

        let err = CompiledFilter::compile(&Filters::from(json!({"a": {"$in": 3}}))).unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
    }
}
