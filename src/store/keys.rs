use std::fmt;

use crate::core::ParamValue;

/// The fixed set of keys a [`ParameterStore`](super::ParameterStore) recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamKey {
    Name,
    Page,
    PerPage,
    Filters,
    Fields,
    Sort,
    TotalItems,
    Ready,
    Debug,
    SubscriptionId,
}

impl ParamKey {
    pub const ALL: [ParamKey; 10] = [
        ParamKey::Name,
        ParamKey::Page,
        ParamKey::PerPage,
        ParamKey::Filters,
        ParamKey::Fields,
        ParamKey::Sort,
        ParamKey::TotalItems,
        ParamKey::Ready,
        ParamKey::Debug,
        ParamKey::SubscriptionId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Page => "page",
            Self::PerPage => "perPage",
            Self::Filters => "filters",
            Self::Fields => "fields",
            Self::Sort => "sort",
            Self::TotalItems => "totalItems",
            Self::Ready => "ready",
            Self::Debug => "debug",
            Self::SubscriptionId => "subscriptionId",
        }
    }

    /// Keys maintained by the controller itself. [`ParameterStore::set`]
    /// refuses them.
    ///
    /// [`ParameterStore::set`]: super::ParameterStore::set
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Name | Self::Ready | Self::SubscriptionId)
    }

    /// Whether `value` is a usable value for this key.
    pub fn accepts(&self, value: &ParamValue) -> bool {
        match self {
            Self::Page | Self::PerPage => value.as_count().is_some_and(|n| n > 0),
            Self::TotalItems => value.as_count().is_some(),
            Self::Filters => value.as_filters().is_some(),
            Self::Fields => value.as_fields().is_some(),
            Self::Sort => value.as_sort().is_some(),
            Self::Ready | Self::Debug => value.as_flag().is_some(),
            Self::Name => value.as_str().is_some_and(|s| !s.is_empty()),
            Self::SubscriptionId => value.as_subscription().is_some(),
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
