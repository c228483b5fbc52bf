use crate::core::{CountKey, FindOptions, Record, Result, ScopeSelector};
use crate::store::ParameterStore;

use super::trace::QueryTrace;
use super::{Shared, count, params, subscription};

/// Materialize the current page from the local cache.
///
/// Pending parameter changes are applied first. When the active
/// subscription is ready the total is refreshed, which may clamp the page
/// and replace the subscription; the read then targets whichever
/// subscription is active afterwards. Never waits for readiness: an
/// unready read returns whatever the cache holds.
pub(crate) fn read_page(store: &ParameterStore, shared: &Shared) -> Result<Vec<Record>> {
    store.flush();
    if refresh_total(store, shared)? {
        subscription::invalidate(store, shared);
        store.flush();
    }

    let Some(id) = params::subscription_id(store) else {
        return Ok(Vec::new());
    };
    let selector = ScopeSelector::for_subscription(&id);

    let mut options = FindOptions {
        fields: params::fields(store),
        sort: params::sort(store),
        debug: false,
    };
    if params::debug(store) {
        (shared.trace)(&QueryTrace::find(&shared.name, &selector, &options));
        options.debug = true;
    }

    Ok(shared.cache.find(&selector, &options)?)
}

/// Returns whether the refresh moved the current page.
fn refresh_total(store: &ParameterStore, shared: &Shared) -> Result<bool> {
    if !params::ready(store) {
        return Ok(false);
    }
    let Some(id) = params::subscription_id(store) else {
        return Ok(false);
    };

    match shared.counts.count(&CountKey::for_subscription(&id))? {
        Some(total) => Ok(count::set_total_items(store, total)),
        None => Ok(false),
    }
}
