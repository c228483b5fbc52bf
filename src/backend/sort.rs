// ============================================================================
// src/backend/sort.rs - Record ordering
// ============================================================================
//
// Multi-key, stable ordering of JSON records.
//
// - Missing fields and explicit nulls are both treated as NULL
// - NULLS LAST for ascending keys, NULLS FIRST for descending keys
// - Values of different JSON types order by type rank
//   (number < string < object < array < boolean)
//
// ============================================================================

use std::cmp::Ordering;

use serde_json::Value as JsonValue;

use super::filter::lookup_path;
use crate::core::{Record, SortDirection, SortSpec};

/// Strategy for placing NULL values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrdering {
    NullsFirst,
    NullsLast,
}

impl NullOrdering {
    pub fn default_for_direction(direction: SortDirection) -> Self {
        if direction.is_descending() {
            Self::NullsFirst
        } else {
            Self::NullsLast
        }
    }
}

/// One field of a sort specification
#[derive(Debug, Clone)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
    pub null_ordering: NullOrdering,
}

impl SortKey {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
            null_ordering: NullOrdering::default_for_direction(direction),
        }
    }

    pub fn keys_from_spec(spec: &SortSpec) -> Vec<SortKey> {
        spec.keys()
            .iter()
            .map(|(field, direction)| SortKey::new(field.clone(), *direction))
            .collect()
    }
}

// ============================================================================
// RECORD COMPARATOR
// ============================================================================

pub struct RecordComparator<'a> {
    sort_keys: &'a [SortKey],
}

impl<'a> RecordComparator<'a> {
    pub fn new(sort_keys: &'a [SortKey]) -> Self {
        Self { sort_keys }
    }

    pub fn compare(&self, left: &Record, right: &Record) -> Ordering {
        for key in self.sort_keys {
            let ordering = self.compare_by_key(left, right, key);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    fn compare_by_key(&self, left: &Record, right: &Record, key: &SortKey) -> Ordering {
        let left = lookup_path(left, &key.field).filter(|v| !v.is_null());
        let right = lookup_path(right, &key.field).filter(|v| !v.is_null());

        // NULL placement is absolute; the direction only flips non-NULL order.
        match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => match key.null_ordering {
                NullOrdering::NullsFirst => Ordering::Less,
                NullOrdering::NullsLast => Ordering::Greater,
            },
            (Some(_), None) => match key.null_ordering {
                NullOrdering::NullsFirst => Ordering::Greater,
                NullOrdering::NullsLast => Ordering::Less,
            },
            (Some(a), Some(b)) => {
                let ordering = compare_values(a, b);
                if key.direction.is_descending() {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
        }
    }
}

fn type_rank(value: &JsonValue) -> u8 {
    match value {
        JsonValue::Null => 0,
        JsonValue::Number(_) => 1,
        JsonValue::String(_) => 2,
        JsonValue::Object(_) => 3,
        JsonValue::Array(_) => 4,
        JsonValue::Bool(_) => 5,
    }
}

/// Total order over non-null JSON values.
pub fn compare_values(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return x.cmp(&y);
            }
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            }
        }
        (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        (JsonValue::Array(x), JsonValue::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ordering = compare_values(left, right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (JsonValue::Object(_), JsonValue::Object(_)) => Ordering::Equal,
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Stable in-place sort of `records` by `spec`.
pub fn sort_records(records: &mut [Record], spec: &SortSpec) {
    if records.is_empty() || spec.is_empty() {
        return;
    }
    let keys = SortKey::keys_from_spec(spec);
    let comparator = RecordComparator::new(&keys);
    records.sort_by(|left, right| comparator.compare(left, right));
}
