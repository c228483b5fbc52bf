//! Typed reads and validated writes over the parameter store.
//!
//! Reads go through [`ParameterStore::get`], so inside an effect they are
//! recorded as dependencies.

use crate::core::{Filters, ParamValue, Projection, SortSpec, SubscriptionId};
use crate::store::{ParamKey, ParameterStore};

pub(crate) fn page(store: &ParameterStore) -> u64 {
    store
        .get(ParamKey::Page)
        .and_then(|v| v.as_count())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

pub(crate) fn per_page(store: &ParameterStore) -> u64 {
    store
        .get(ParamKey::PerPage)
        .and_then(|v| v.as_count())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

pub(crate) fn filters(store: &ParameterStore) -> Filters {
    store
        .get(ParamKey::Filters)
        .and_then(|v| v.as_filters().cloned())
        .unwrap_or_default()
}

pub(crate) fn fields(store: &ParameterStore) -> Projection {
    store
        .get(ParamKey::Fields)
        .and_then(|v| v.as_fields().cloned())
        .unwrap_or_default()
}

pub(crate) fn sort(store: &ParameterStore) -> SortSpec {
    store
        .get(ParamKey::Sort)
        .and_then(|v| v.as_sort().cloned())
        .unwrap_or_default()
}

pub(crate) fn debug(store: &ParameterStore) -> bool {
    flag(store, ParamKey::Debug)
}

pub(crate) fn ready(store: &ParameterStore) -> bool {
    flag(store, ParamKey::Ready)
}

pub(crate) fn total_items(store: &ParameterStore) -> Option<u64> {
    store.get(ParamKey::TotalItems).and_then(|v| v.as_count())
}

pub(crate) fn subscription_id(store: &ParameterStore) -> Option<SubscriptionId> {
    store
        .get(ParamKey::SubscriptionId)
        .and_then(|v| v.as_subscription().cloned())
}

fn flag(store: &ParameterStore, key: ParamKey) -> bool {
    store
        .get(key)
        .and_then(|v| v.as_flag())
        .unwrap_or(false)
}

/// Pages start at 1; anything lower is ignored.
pub(crate) fn set_page(store: &ParameterStore, page: u64) -> bool {
    page >= 1 && store.write(ParamKey::Page, page)
}

/// Page size must be positive; zero is ignored.
pub(crate) fn set_per_page(store: &ParameterStore, per_page: u64) -> bool {
    per_page > 0 && store.write(ParamKey::PerPage, per_page)
}

/// Seed `key` with `default` unless it already holds a valid value.
pub(crate) fn seed(store: &ParameterStore, key: ParamKey, default: impl Into<ParamValue>) {
    let present = store.peek(key).is_some_and(|value| key.accepts(&value));
    if !present {
        store.write(key, default);
    }
}
