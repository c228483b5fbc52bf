use std::fmt;

use super::types::{Filters, Projection, SortSpec, SubscriptionId};

/// A value held by the parameter store.
///
/// Equality is structural; the store relies on it to turn unchanged writes
/// into no-ops.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Count(u64),
    Flag(bool),
    Filters(Filters),
    Fields(Projection),
    Sort(SortSpec),
    Subscription(SubscriptionId),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "TEXT",
            Self::Count(_) => "COUNT",
            Self::Flag(_) => "FLAG",
            Self::Filters(_) => "FILTERS",
            Self::Fields(_) => "FIELDS",
            Self::Sort(_) => "SORT",
            Self::Subscription(_) => "SUBSCRIPTION",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            Self::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_filters(&self) -> Option<&Filters> {
        match self {
            Self::Filters(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_fields(&self) -> Option<&Projection> {
        match self {
            Self::Fields(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_sort(&self) -> Option<&SortSpec> {
        match self {
            Self::Sort(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_subscription(&self) -> Option<&SubscriptionId> {
        match self {
            Self::Subscription(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Count(n) => write!(f, "{n}"),
            Self::Flag(b) => write!(f, "{b}"),
            Self::Subscription(id) => write!(f, "{id}"),
            Self::Filters(v) => write_json(f, v),
            Self::Fields(v) => write_json(f, v),
            Self::Sort(v) => write_json(f, v),
        }
    }
}

fn write_json<T: serde::Serialize>(f: &mut fmt::Formatter<'_>, value: &T) -> fmt::Result {
    let encoded = serde_json::to_string(value).map_err(|_| fmt::Error)?;
    f.write_str(&encoded)
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<u64> for ParamValue {
    fn from(n: u64) -> Self {
        Self::Count(n)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Flag(b)
    }
}

impl From<Filters> for ParamValue {
    fn from(f: Filters) -> Self {
        Self::Filters(f)
    }
}

impl From<Projection> for ParamValue {
    fn from(p: Projection) -> Self {
        Self::Fields(p)
    }
}

impl From<SortSpec> for ParamValue {
    fn from(s: SortSpec) -> Self {
        Self::Sort(s)
    }
}

impl From<SubscriptionId> for ParamValue {
    fn from(id: SubscriptionId) -> Self {
        Self::Subscription(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structural_equality() {
        let a = ParamValue::from(Filters::from(json!({"status": "active", "tier": 2})));
        let b = ParamValue::from(Filters::from(json!({"tier": 2, "status": "active"})));
        assert_eq!(a, b);
        assert_ne!(a, ParamValue::from(Filters::new()));
    }

    #[test]
    fn test_accessors_match_variant() {
        assert_eq!(ParamValue::from(3u64).as_count(), Some(3));
        assert_eq!(ParamValue::from(true).as_count(), None);
        assert_eq!(ParamValue::from("feed").as_str(), Some("feed"));
        assert_eq!(ParamValue::from(false).as_flag(), Some(false));
    }

    #[test]
    fn test_display_uses_json_for_structured_values() {
        let sort = ParamValue::from(SortSpec::default());
        assert_eq!(sort.to_string(), r#"{"id":1}"#);
        assert_eq!(ParamValue::from(7u64).to_string(), "7");
    }
}
