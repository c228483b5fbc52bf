// ============================================================================
// Subscription effect
// ============================================================================
//
// Keeps exactly one live subscription matching the current parameters.
// Each run:
//   1. reads fields, sort, page, per_page, filters, debug (all tracked)
//   2. derives {fields, sort, skip, limit} and traces it when debugging
//   3. clears `ready`
//   4. subscribes, arming a callback that sets `ready` for this generation only
//   5. records the new subscription id
//
// ============================================================================

use std::rc::{Rc, Weak};

use crate::backend::{ReadyCallback, SubscribeRequest};
use crate::core::QueryOptions;
use crate::store::{EffectHandle, ParamKey, ParameterStore, WeakParameterStore};

use super::Shared;
use super::params;
use super::trace::QueryTrace;

pub(crate) fn start(store: &ParameterStore, shared: Rc<Shared>) -> EffectHandle {
    store.create_effect(move |store| run(store, &shared))
}

fn run(store: &ParameterStore, shared: &Rc<Shared>) {
    let fields = params::fields(store);
    let sort = params::sort(store);
    let page = params::page(store);
    let per_page = params::per_page(store);
    let filters = params::filters(store);
    let debug = params::debug(store);

    let mut options = QueryOptions::for_page(page, per_page, fields, sort);
    if debug {
        (shared.trace)(&QueryTrace::subscribe(&shared.name, &filters, &options));
        options.debug = true;
    }

    store.write(ParamKey::Ready, false);

    let generation = shared.generation.get() + 1;
    shared.generation.set(generation);
    let on_ready = ready_callback(store.downgrade(), Rc::downgrade(shared), generation);

    let request = SubscribeRequest {
        name: &shared.name,
        filters: &filters,
        options: &options,
    };
    let handle = match shared.transport.subscribe(request, on_ready) {
        Ok(handle) => handle,
        Err(err) => {
            tracing::warn!(feed = %shared.name, error = %err, "subscribe failed");
            shared.last_error.replace(Some(err));
            return;
        }
    };

    shared.last_error.replace(None);
    let id = handle.subscription_id().clone();
    tracing::debug!(
        feed = %shared.name,
        subscription = %id,
        skip = options.skip,
        limit = options.limit,
        "subscription opened"
    );

    let previous = shared.active.replace(Some(handle));
    if let Some(previous) = previous {
        if shared.release_superseded {
            tracing::debug!(subscription = %previous.subscription_id(), "releasing superseded subscription");
            shared.transport.stop(previous.subscription_id());
        } else {
            tracing::trace!(subscription = %previous.subscription_id(), "superseded subscription left open");
        }
    }

    store.write(ParamKey::SubscriptionId, id);
}

/// Mark the current subscription stale after a parameter change.
///
/// `ready` drops at once and any readiness still in flight for the old
/// generation is ignored, even though the replacement subscription only
/// opens at the next flush.
pub(crate) fn invalidate(store: &ParameterStore, shared: &Shared) {
    if shared.disposed.get() {
        return;
    }
    shared.generation.set(shared.generation.get() + 1);
    store.write(ParamKey::Ready, false);
}

/// Sets `ready` once, and only if no newer generation has started since.
fn ready_callback(store: WeakParameterStore, shared: Weak<Shared>, generation: u64) -> ReadyCallback {
    Box::new(move || {
        let (Some(store), Some(shared)) = (store.upgrade(), shared.upgrade()) else {
            return;
        };
        if shared.disposed.get() || shared.generation.get() != generation {
            tracing::trace!(generation, "ignoring readiness of a superseded subscription");
            return;
        }
        store.write(ParamKey::Ready, true);
        store.flush();
    })
}
