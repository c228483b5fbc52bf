use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

/// Field every record is identified by; the default sort orders on it.
pub const ID_FIELD: &str = "id";

/// A materialized record as delivered to the local cache.
pub type Record = Map<String, JsonValue>;

// ============================================================================
// FILTERS
// ============================================================================

/// Server-side record constraints, keyed by field.
///
/// An empty mapping means "no filter". Any non-object value normalizes to
/// the empty mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "JsonValue")]
pub struct Filters(Map<String, JsonValue>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality (or operator object) constraint for `field`
    pub fn with(mut self, field: impl Into<String>, constraint: impl Into<JsonValue>) -> Self {
        self.0.insert(field.into(), constraint.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.0.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }
}

impl From<Map<String, JsonValue>> for Filters {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl From<JsonValue> for Filters {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

impl From<Option<Filters>> for Filters {
    fn from(value: Option<Filters>) -> Self {
        value.unwrap_or_default()
    }
}

// ============================================================================
// PROJECTION
// ============================================================================

/// Field projection: `true` includes a field, `false` excludes it.
///
/// Serialized in the conventional `{field: 1 | 0}` form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection(BTreeMap<String, bool>);

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), true);
        self
    }

    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), false);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &bool)> {
        self.0.iter()
    }

    /// Whether any field is explicitly included (inclusion mode)
    pub fn is_inclusive(&self) -> bool {
        self.0.values().any(|included| *included)
    }

    pub fn mode_of(&self, field: &str) -> Option<bool> {
        self.0.get(field).copied()
    }

    /// Apply the projection to a record.
    ///
    /// In inclusion mode only listed fields survive, plus the id field unless
    /// it is explicitly excluded. Otherwise listed fields are dropped.
    pub fn apply(&self, record: &Record) -> Record {
        if self.is_empty() {
            return record.clone();
        }

        if self.is_inclusive() {
            record
                .iter()
                .filter(|(field, _)| match self.mode_of(field) {
                    Some(included) => included,
                    None => field.as_str() == ID_FIELD,
                })
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect()
        } else {
            record
                .iter()
                .filter(|(field, _)| self.mode_of(field).is_none())
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect()
        }
    }
}

impl Serialize for Projection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, included) in &self.0 {
            map.serialize_entry(field, &u8::from(*included))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Projection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, JsonValue>::deserialize(deserializer)?;
        let fields = raw
            .into_iter()
            .map(|(field, mode)| {
                let included = match mode {
                    JsonValue::Bool(b) => b,
                    JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                    _ => false,
                };
                (field, included)
            })
            .collect();
        Ok(Self(fields))
    }
}

// ============================================================================
// SORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn is_descending(&self) -> bool {
        matches!(self, Self::Descending)
    }
}

impl Serialize for SortDirection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Ascending => serializer.serialize_i8(1),
            Self::Descending => serializer.serialize_i8(-1),
        }
    }
}

impl TryFrom<JsonValue> for SortDirection {
    type Error = String;

    fn try_from(value: JsonValue) -> std::result::Result<Self, Self::Error> {
        match &value {
            JsonValue::Number(n) => match n.as_i64() {
                Some(1) => Ok(Self::Ascending),
                Some(-1) => Ok(Self::Descending),
                _ => Err(format!("invalid sort direction: {value}")),
            },
            JsonValue::String(s) => match s.to_ascii_lowercase().as_str() {
                "asc" | "ascending" => Ok(Self::Ascending),
                "desc" | "descending" => Ok(Self::Descending),
                _ => Err(format!("invalid sort direction: {value}")),
            },
            _ => Err(format!("invalid sort direction: {value}")),
        }
    }
}

impl<'de> Deserialize<'de> for SortDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = JsonValue::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// Ordered field → direction mapping. Earlier entries take precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec(Vec<(String, SortDirection)>);

impl SortSpec {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn by(field: impl Into<String>, direction: SortDirection) -> Self {
        Self(vec![(field.into(), direction)])
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self::by(field, SortDirection::Ascending)
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self::by(field, SortDirection::Descending)
    }

    /// Append a lower-precedence key. A field already present is replaced in place.
    pub fn then(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        let field = field.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == field) {
            Some(entry) => entry.1 = direction,
            None => self.0.push((field, direction)),
        }
        self
    }

    pub fn keys(&self) -> &[(String, SortDirection)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::ascending(ID_FIELD)
    }
}

impl Serialize for SortSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, direction) in &self.0 {
            map.serialize_entry(field, direction)?;
        }
        map.end()
    }
}

struct SortSpecVisitor;

impl<'de> Visitor<'de> for SortSpecVisitor {
    type Value = SortSpec;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of field to sort direction")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<SortSpec, A::Error> {
        let mut spec = SortSpec::empty();
        while let Some((field, direction)) = access.next_entry::<String, SortDirection>()? {
            spec = spec.then(field, direction);
        }
        Ok(spec)
    }
}

impl<'de> Deserialize<'de> for SortSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(SortSpecVisitor)
    }
}

// ============================================================================
// QUERY OPTIONS
// ============================================================================

/// Windowing options sent with a subscription request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOptions {
    pub fields: Projection,
    pub sort: SortSpec,
    pub skip: u64,
    pub limit: u64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub debug: bool,
}

impl QueryOptions {
    /// Options for the 1-based `page` of size `per_page`.
    pub fn for_page(page: u64, per_page: u64, fields: Projection, sort: SortSpec) -> Self {
        Self {
            fields,
            sort,
            skip: page.saturating_sub(1).saturating_mul(per_page),
            limit: per_page,
            debug: false,
        }
    }
}

/// Options for a read against the local cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindOptions {
    pub fields: Projection,
    pub sort: SortSpec,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub debug: bool,
}

// ============================================================================
// SUBSCRIPTION IDENTITY
// ============================================================================

/// Opaque handle naming one subscription generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local-cache selector matching the records delivered by one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeSelector(String);

impl ScopeSelector {
    pub fn for_subscription(id: &SubscriptionId) -> Self {
        Self(format!("scope:{id}"))
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}

impl Serialize for ScopeSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.0, &1)?;
        map.end()
    }
}

/// Aggregate-count key for one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CountKey(String);

impl CountKey {
    pub fn for_subscription(id: &SubscriptionId) -> Self {
        Self(format!("count:{id}"))
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}
