//! The pagination controller.
//!
//! [`PaginationController`] owns a [`ParameterStore`] and keeps a live
//! subscription in step with it. Construction goes through
//! [`PaginationController::builder`] only; it starts the subscription
//! effect immediately.
//!
//! Setters clear `ready` at once but resubscribe lazily: consecutive
//! changes are applied together at the next flush, which happens before
//! [`ready`](PaginationController::ready),
//! [`subscription_id`](PaginationController::subscription_id) and
//! [`get_page`](PaginationController::get_page) answer, after a
//! [`batch`](PaginationController::batch), or on an explicit
//! [`flush`](PaginationController::flush).
//!
//! ```
//! use std::rc::Rc;
//! use livepage::{MemoryBackend, PaginationConfig, PaginationController};
//! use serde_json::json;
//!
//! # fn main() -> livepage::Result<()> {
//! let records = (1..=25)
//!     .map(|i| json!({"id": i}).as_object().cloned().unwrap())
//!     .collect();
//! let backend = Rc::new(MemoryBackend::new().with_feed("items", records));
//!
//! let pager = PaginationController::builder(PaginationConfig::new("items").per_page(10))
//!     .backend(backend.clone())
//!     .build()?;
//!
//! backend.deliver_ready();
//! assert!(pager.ready());
//! assert_eq!(pager.get_page()?.len(), 10);
//! assert_eq!(pager.total_pages(), 3);
//! # Ok(())
//! # }
//! ```

mod count;
mod params;
mod subscription;
mod trace;
mod view;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::backend::{CountSource, LocalCache, SubscriptionHandle, Transport};
use crate::config::PaginationConfig;
use crate::core::{
    Filters, PagerError, Projection, Record, Result, SortSpec, SubscriptionId, TransportError,
};
use crate::store::{EffectHandle, ParamKey, ParameterStore};

pub use count::total_pages;
pub use trace::{QueryTrace, TraceHook, default_hook, log_trace};

/// State shared between the controller, its effect and readiness callbacks.
pub(crate) struct Shared {
    name: String,
    transport: Rc<dyn Transport>,
    cache: Rc<dyn LocalCache>,
    counts: Rc<dyn CountSource>,
    trace: TraceHook,
    release_superseded: bool,
    generation: Cell<u64>,
    active: RefCell<Option<SubscriptionHandle>>,
    last_error: RefCell<Option<TransportError>>,
    disposed: Cell<bool>,
}

pub struct PaginationController {
    store: ParameterStore,
    shared: Rc<Shared>,
    effect: EffectHandle,
}

impl PaginationController {
    pub fn builder(config: PaginationConfig) -> PaginationControllerBuilder {
        PaginationControllerBuilder::new(config)
    }

    /// Remote feed identifier, fixed at construction
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------------

    pub fn current_page(&self) -> u64 {
        params::page(&self.store)
    }

    /// Move to `page`. Values below 1 are ignored. Returns the resulting page.
    pub fn set_current_page(&self, page: u64) -> u64 {
        self.changed(params::set_page(&self.store, page));
        self.current_page()
    }

    pub fn per_page(&self) -> u64 {
        params::per_page(&self.store)
    }

    /// Change the page size. Zero is ignored. Returns the resulting size.
    pub fn set_per_page(&self, per_page: u64) -> u64 {
        self.changed(params::set_per_page(&self.store, per_page));
        self.per_page()
    }

    pub fn filters(&self) -> Filters {
        params::filters(&self.store)
    }

    /// Replace the filters. Empty or non-object input means "no filter".
    pub fn set_filters(&self, filters: impl Into<Filters>) -> Filters {
        self.changed(self.store.write(ParamKey::Filters, filters.into()));
        self.filters()
    }

    pub fn fields(&self) -> Projection {
        params::fields(&self.store)
    }

    pub fn set_fields(&self, fields: Projection) -> Projection {
        self.changed(self.store.write(ParamKey::Fields, fields));
        self.fields()
    }

    pub fn sort(&self) -> SortSpec {
        params::sort(&self.store)
    }

    pub fn set_sort(&self, sort: SortSpec) -> SortSpec {
        self.changed(self.store.write(ParamKey::Sort, sort));
        self.sort()
    }

    pub fn debug(&self) -> bool {
        params::debug(&self.store)
    }

    pub fn set_debug(&self, debug: bool) -> bool {
        self.changed(self.store.write(ParamKey::Debug, debug));
        self.debug()
    }

    fn changed(&self, changed: bool) {
        if changed {
            subscription::invalidate(&self.store, &self.shared);
        }
    }

    // ------------------------------------------------------------------------
    // Counts and status
    // ------------------------------------------------------------------------

    /// Total matching records, unknown until the first ready refresh
    pub fn total_items(&self) -> Option<u64> {
        params::total_items(&self.store)
    }

    /// Record a new total, clamping the current page if it now lies past
    /// the end of the result set.
    pub fn set_total_items(&self, total: u64) -> Option<u64> {
        self.changed(count::set_total_items(&self.store, total));
        self.total_items()
    }

    pub fn total_pages(&self) -> u64 {
        total_pages(self.total_items(), self.per_page())
    }

    /// Whether the active subscription has delivered its initial dataset
    pub fn ready(&self) -> bool {
        self.store.flush();
        params::ready(&self.store)
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.store.flush();
        params::subscription_id(&self.store)
    }

    /// Error returned by the most recent subscribe attempt, if it failed
    pub fn subscription_error(&self) -> Option<TransportError> {
        self.store.flush();
        self.shared.last_error.borrow().clone()
    }

    // ------------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------------

    /// Snapshot of the current page from the local cache.
    pub fn get_page(&self) -> Result<Vec<Record>> {
        view::read_page(&self.store, &self.shared)
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    pub fn has_next_page(&self) -> bool {
        self.current_page() < self.total_pages()
    }

    pub fn has_previous_page(&self) -> bool {
        self.current_page() > 1
    }

    /// Advance one page, stopping at the last known page
    pub fn next_page(&self) -> u64 {
        if self.has_next_page() {
            self.set_current_page(self.current_page() + 1)
        } else {
            self.current_page()
        }
    }

    pub fn previous_page(&self) -> u64 {
        if self.has_previous_page() {
            self.set_current_page(self.current_page() - 1)
        } else {
            self.current_page()
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Apply several mutations, resubscribing once when `f` returns.
    pub fn batch<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.store.batch(|| f(self))
    }

    /// Resubscribe now if any parameter changed since the last flush.
    pub fn flush(&self) {
        self.store.flush();
    }

    /// Stop reacting to parameter changes and release the active subscription.
    ///
    /// Parameters stay readable and writable afterwards but no longer drive
    /// any subscription. Dropping the controller disposes it.
    pub fn dispose(&self) {
        if self.shared.disposed.replace(true) {
            return;
        }
        self.effect.dispose();

        let active = self.shared.active.borrow_mut().take();
        if let Some(handle) = active {
            self.shared.transport.stop(handle.subscription_id());
        }
        self.store.write(ParamKey::Ready, false);
        self.store.flush();
        tracing::debug!(feed = %self.shared.name, "pagination controller disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.get()
    }
}

impl Drop for PaginationController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for PaginationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaginationController")
            .field("name", &self.shared.name)
            .field("store", &self.store)
            .field("disposed", &self.shared.disposed.get())
            .finish()
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// The only way to construct a [`PaginationController`].
pub struct PaginationControllerBuilder {
    config: PaginationConfig,
    store: Option<ParameterStore>,
    transport: Option<Rc<dyn Transport>>,
    cache: Option<Rc<dyn LocalCache>>,
    counts: Option<Rc<dyn CountSource>>,
    trace: Option<TraceHook>,
}

impl PaginationControllerBuilder {
    fn new(config: PaginationConfig) -> Self {
        Self {
            config,
            store: None,
            transport: None,
            cache: None,
            counts: None,
            trace: None,
        }
    }

    /// Use one service for transport, local cache and counts
    pub fn backend<B>(mut self, backend: Rc<B>) -> Self
    where
        B: Transport + LocalCache + CountSource + 'static,
    {
        let transport: Rc<dyn Transport> = backend.clone();
        let cache: Rc<dyn LocalCache> = backend.clone();
        let counts: Rc<dyn CountSource> = backend;
        self.transport = Some(transport);
        self.cache = Some(cache);
        self.counts = Some(counts);
        self
    }

    pub fn transport(mut self, transport: Rc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cache(mut self, cache: Rc<dyn LocalCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn counts(mut self, counts: Rc<dyn CountSource>) -> Self {
        self.counts = Some(counts);
        self
    }

    /// Attach to an existing store; keys it already holds keep their values.
    pub fn store(mut self, store: ParameterStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Receive query traces instead of the default `tracing` output
    pub fn trace_hook(mut self, hook: impl Fn(&QueryTrace) + 'static) -> Self {
        self.trace = Some(Rc::new(hook));
        self
    }

    pub fn build(self) -> Result<PaginationController> {
        self.config.validate()?;

        let transport = self
            .transport
            .ok_or_else(|| PagerError::configuration("a transport is required"))?;
        let cache = self
            .cache
            .ok_or_else(|| PagerError::configuration("a local cache is required"))?;
        let counts = self
            .counts
            .ok_or_else(|| PagerError::configuration("a count source is required"))?;

        let config = self.config;
        let store = self.store.unwrap_or_default();
        store.batch(|| {
            store.write(ParamKey::Name, config.name.as_str());
            params::seed(&store, ParamKey::Page, config.page);
            params::seed(&store, ParamKey::PerPage, config.per_page);
            params::seed(&store, ParamKey::Filters, config.filters.clone());
            params::seed(&store, ParamKey::Fields, config.fields.clone());
            params::seed(&store, ParamKey::Sort, config.sort.clone());
            params::seed(&store, ParamKey::Debug, config.debug);
        });

        let shared = Rc::new(Shared {
            name: config.name,
            transport,
            cache,
            counts,
            trace: self.trace.unwrap_or_else(default_hook),
            release_superseded: config.release_superseded,
            generation: Cell::new(0),
            active: RefCell::new(None),
            last_error: RefCell::new(None),
            disposed: Cell::new(false),
        });

        let effect = subscription::start(&store, shared.clone());
        tracing::debug!(feed = %shared.name, "pagination controller started");

        Ok(PaginationController {
            store,
            shared,
            effect,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;

    fn backend(count: i64) -> Rc<MemoryBackend> {
        let records = (1..=count)
            .map(|i| json!({"id": i, "even": i % 2 == 0}).as_object().cloned().unwrap())
            .collect();
        Rc::new(MemoryBackend::new().with_feed("items", records))
    }

    #[test]
    fn test_build_requires_collaborators() {
        let err = PaginationController::builder(PaginationConfig::new("items"))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());

        let backend = backend(3);
        let transport: Rc<dyn Transport> = backend.clone();
        let err = PaginationController::builder(PaginationConfig::new("items"))
            .transport(transport)
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let err = PaginationController::builder(PaginationConfig::new("items").per_page(0))
            .backend(backend(3))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_effect_tracks_every_query_parameter() {
        let pager = PaginationController::builder(PaginationConfig::new("items"))
            .backend(backend(3))
            .build()
            .unwrap();

        assert_eq!(
            pager.effect.dependencies(),
            vec![
                ParamKey::Page,
                ParamKey::PerPage,
                ParamKey::Filters,
                ParamKey::Fields,
                ParamKey::Sort,
                ParamKey::Debug,
            ]
        );
        assert_eq!(pager.effect.run_count(), 1);
    }

    #[test]
    fn test_total_items_clamp_resubscribes_once() {
        let backend = backend(40);
        let pager = PaginationController::builder(PaginationConfig::new("items").page(4))
            .backend(backend.clone())
            .build()
            .unwrap();

        pager.set_total_items(15);
        assert_eq!(pager.current_page(), 2);
        assert!(!pager.ready());
        pager.flush();
        assert_eq!(pager.effect.run_count(), 2);
        assert_eq!(backend.requests().len(), 2);
    }

    #[test]
    fn test_drop_unregisters_effect_from_shared_store() {
        let backend = backend(5);
        let store = ParameterStore::new();
        let pager = PaginationController::builder(PaginationConfig::new("items"))
            .backend(backend.clone())
            .store(store.clone())
            .build()
            .unwrap();
        assert_eq!(store.effect_count(), 1);

        drop(pager);
        assert_eq!(store.effect_count(), 0);
        assert_eq!(backend.active_subscriptions(), 0);

        store.set(ParamKey::Page, 3u64);
        store.flush();
        assert_eq!(backend.requests().len(), 1);
    }

    #[test]
    fn test_dispose_stops_everything() {
        let backend = backend(5);
        let pager = PaginationController::builder(PaginationConfig::new("items"))
            .backend(backend.clone())
            .build()
            .unwrap();
        assert_eq!(backend.active_subscriptions(), 1);

        pager.dispose();
        assert!(pager.is_disposed());
        assert_eq!(backend.active_subscriptions(), 0);

        pager.set_current_page(2);
        assert_eq!(backend.requests().len(), 1);
        assert_eq!(backend.deliver_ready(), 0);
        assert!(!pager.ready());
    }
}
