// ============================================================================
// In-memory backend
// ============================================================================
//
// Plays all three external roles in one process:
// - Transport: named feeds of records; each subscription evaluates
//   filter → sort → skip/limit → projection and keeps its window live
// - LocalCache: the windows, addressable by `scope:<subscription id>`
// - CountSource: total matches per subscription under `count:<id>`
//
// Readiness is not signalled from inside `subscribe`. Callbacks queue up
// until `deliver_ready` runs, which stands in for the next tick of the
// cooperative event loop.
//
// ============================================================================

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use serde_json::Value as JsonValue;

use super::filter::CompiledFilter;
use super::sort::sort_records;
use super::{
    CountSource, LocalCache, ReadyCallback, SubscribeRequest, SubscriptionHandle, Transport,
    TransportResult,
};
use crate::core::{
    CountKey, Filters, FindOptions, ID_FIELD, QueryOptions, Record, ScopeSelector, SubscriptionId,
    TransportError,
};

struct LiveSubscription {
    feed: String,
    filter: CompiledFilter,
    options: QueryOptions,
    window: Vec<Record>,
    total: u64,
}

impl LiveSubscription {
    fn refresh(&mut self, records: &[Record]) {
        let mut matched: Vec<Record> = records
            .iter()
            .filter(|record| self.filter.matches(record))
            .cloned()
            .collect();
        self.total = matched.len() as u64;
        sort_records(&mut matched, &self.options.sort);

        let skip = usize::try_from(self.options.skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(self.options.limit).unwrap_or(usize::MAX);
        self.window = matched
            .iter()
            .skip(skip)
            .take(limit)
            .map(|record| self.options.fields.apply(record))
            .collect();
    }
}

/// A subscribe call as the backend received it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub name: String,
    pub filters: Filters,
    pub options: QueryOptions,
}

#[derive(Default)]
struct MemoryState {
    feeds: HashMap<String, Vec<Record>>,
    subscriptions: BTreeMap<SubscriptionId, LiveSubscription>,
    pending_ready: Vec<(SubscriptionId, ReadyCallback)>,
    requests: Vec<RecordedRequest>,
    stopped: Vec<SubscriptionId>,
    fail_next: Option<TransportError>,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: RefCell<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feed with its initial records
    pub fn with_feed(self, name: impl Into<String>, records: Vec<Record>) -> Self {
        self.state.borrow_mut().feeds.insert(name.into(), records);
        self
    }

    pub fn create_feed(&self, name: impl Into<String>) {
        self.state.borrow_mut().feeds.entry(name.into()).or_default();
    }

    /// Append a record to a feed; live subscriptions on it are re-evaluated.
    pub fn insert(&self, feed: &str, record: Record) {
        let mut state = self.state.borrow_mut();
        state.feeds.entry(feed.to_string()).or_default().push(record);
        Self::refresh_feed(&mut state, feed);
    }

    /// Remove records whose id equals `id`. Returns how many were removed.
    pub fn remove(&self, feed: &str, id: &JsonValue) -> usize {
        let mut state = self.state.borrow_mut();
        let Some(records) = state.feeds.get_mut(feed) else {
            return 0;
        };
        let before = records.len();
        records.retain(|record| record.get(ID_FIELD) != Some(id));
        let removed = before - records.len();
        if removed > 0 {
            Self::refresh_feed(&mut state, feed);
        }
        removed
    }

    /// Invoke every queued readiness callback. Returns how many fired.
    pub fn deliver_ready(&self) -> usize {
        let pending = std::mem::take(&mut self.state.borrow_mut().pending_ready);
        let fired = pending.len();
        for (id, on_ready) in pending {
            tracing::trace!(subscription = %id, "initial delivery complete");
            on_ready();
        }
        fired
    }

    /// Invoke the queued readiness callback of one subscription only.
    pub fn deliver_ready_for(&self, id: &SubscriptionId) -> bool {
        let callback = {
            let mut state = self.state.borrow_mut();
            let position = state.pending_ready.iter().position(|(pending, _)| pending == id);
            position.map(|index| state.pending_ready.remove(index).1)
        };
        match callback {
            Some(on_ready) => {
                on_ready();
                true
            }
            None => false,
        }
    }

    /// Make the next `subscribe` call fail with `err`.
    pub fn fail_next_subscribe(&self, err: TransportError) {
        self.state.borrow_mut().fail_next = Some(err);
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state.borrow().subscriptions.len()
    }

    pub fn is_live(&self, id: &SubscriptionId) -> bool {
        self.state.borrow().subscriptions.contains_key(id)
    }

    pub fn pending_ready(&self) -> usize {
        self.state.borrow().pending_ready.len()
    }

    /// Every subscribe request received so far, oldest first
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.borrow().requests.clone()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state.borrow().requests.last().cloned()
    }

    pub fn stopped(&self) -> Vec<SubscriptionId> {
        self.state.borrow().stopped.clone()
    }

    fn refresh_feed(state: &mut MemoryState, feed: &str) {
        let MemoryState {
            feeds,
            subscriptions,
            ..
        } = state;
        let records = feeds.get(feed).map(Vec::as_slice).unwrap_or_default();
        for subscription in subscriptions.values_mut().filter(|s| s.feed == feed) {
            subscription.refresh(records);
        }
    }

    fn find_scope<'a>(
        state: &'a MemoryState,
        key: &str,
    ) -> Option<&'a LiveSubscription> {
        state
            .subscriptions
            .iter()
            .find(|(id, _)| ScopeSelector::for_subscription(id).key() == key)
            .map(|(_, subscription)| subscription)
    }
}

impl Transport for MemoryBackend {
    fn subscribe(
        &self,
        request: SubscribeRequest<'_>,
        on_ready: ReadyCallback,
    ) -> TransportResult<SubscriptionHandle> {
        let mut state = self.state.borrow_mut();
        state.requests.push(RecordedRequest {
            name: request.name.to_string(),
            filters: request.filters.clone(),
            options: request.options.clone(),
        });

        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }

        let records = state
            .feeds
            .get(request.name)
            .ok_or_else(|| TransportError::Rejected(format!("unknown feed '{}'", request.name)))?;
        let filter = CompiledFilter::compile(request.filters)?;

        let mut subscription = LiveSubscription {
            feed: request.name.to_string(),
            filter,
            options: request.options.clone(),
            window: Vec::new(),
            total: 0,
        };
        subscription.refresh(records);

        let id = SubscriptionId::generate();
        tracing::debug!(
            subscription = %id,
            feed = request.name,
            total = subscription.total,
            window = subscription.window.len(),
            "memory subscription opened"
        );
        state.subscriptions.insert(id.clone(), subscription);
        state.pending_ready.push((id.clone(), on_ready));

        Ok(SubscriptionHandle::new(id))
    }

    fn stop(&self, id: &SubscriptionId) {
        let mut state = self.state.borrow_mut();
        if let Some(subscription) = state.subscriptions.remove(id) {
            tracing::debug!(
                subscription = %id,
                feed = %subscription.feed,
                window = subscription.window.len(),
                "memory subscription stopped"
            );
            state.stopped.push(id.clone());
        }
        // A stopped subscription never reports readiness.
        state.pending_ready.retain(|(pending, _)| pending != id);
    }
}

impl LocalCache for MemoryBackend {
    fn find(&self, selector: &ScopeSelector, options: &FindOptions) -> TransportResult<Vec<Record>> {
        let state = self.state.borrow();
        let Some(subscription) = Self::find_scope(&state, selector.key()) else {
            return Ok(Vec::new());
        };
        let mut records: Vec<Record> = subscription
            .window
            .iter()
            .map(|record| options.fields.apply(record))
            .collect();
        sort_records(&mut records, &options.sort);
        Ok(records)
    }
}

impl CountSource for MemoryBackend {
    fn count(&self, key: &CountKey) -> TransportResult<Option<u64>> {
        let state = self.state.borrow();
        Ok(state
            .subscriptions
            .iter()
            .find(|(id, _)| CountKey::for_subscription(id) == *key)
            .map(|(_, subscription)| subscription.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Projection, SortSpec};
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn people() -> Vec<Record> {
        (1..=12)
            .map(|i| {
                json!({"id": i, "name": format!("p{i}"), "active": i % 2 == 0})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .collect()
    }

    fn subscribe(
        backend: &MemoryBackend,
        filters: &Filters,
        options: &QueryOptions,
    ) -> (SubscriptionHandle, Rc<Cell<u32>>) {
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        let handle = backend
            .subscribe(
                SubscribeRequest {
                    name: "people",
                    filters,
                    options,
                },
                Box::new(move || counter.set(counter.get() + 1)),
            )
            .unwrap();
        (handle, fired)
    }

    #[test]
    fn test_subscription_window_and_count() {
        let backend = MemoryBackend::new().with_feed("people", people());
        let filters = Filters::new().with("active", true);
        let options = QueryOptions::for_page(2, 4, Projection::new(), SortSpec::default());
        let (handle, fired) = subscribe(&backend, &filters, &options);

        let id = handle.subscription_id();
        assert_eq!(backend.count(&CountKey::for_subscription(id)).unwrap(), Some(6));

        let find = FindOptions {
            fields: Projection::new(),
            sort: SortSpec::default(),
            debug: false,
        };
        let page = backend.find(&ScopeSelector::for_subscription(id), &find).unwrap();
        let ids: Vec<i64> = page.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![10, 12]);

        assert_eq!(fired.get(), 0);
        assert_eq!(backend.deliver_ready(), 1);
        assert_eq!(fired.get(), 1);
        assert_eq!(backend.deliver_ready(), 0);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_live_updates_do_not_refire_ready() {
        let backend = MemoryBackend::new().with_feed("people", people());
        let options = QueryOptions::for_page(1, 100, Projection::new(), SortSpec::default());
        let (handle, fired) = subscribe(&backend, &Filters::new(), &options);
        backend.deliver_ready();

        backend.insert("people", json!({"id": 13}).as_object().cloned().unwrap());
        assert_eq!(backend.remove("people", &json!(1)), 1);
        backend.deliver_ready();

        let key = CountKey::for_subscription(handle.subscription_id());
        assert_eq!(backend.count(&key).unwrap(), Some(12));
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_stop_drops_pending_ready() {
        let backend = MemoryBackend::new().with_feed("people", people());
        let options = QueryOptions::for_page(1, 5, Projection::new(), SortSpec::default());
        let (handle, fired) = subscribe(&backend, &Filters::new(), &options);

        backend.stop(handle.subscription_id());
        assert_eq!(backend.deliver_ready(), 0);
        assert_eq!(fired.get(), 0);
        assert!(!backend.is_live(handle.subscription_id()));
        assert_eq!(backend.stopped(), vec![handle.subscription_id().clone()]);
    }

    #[test]
    fn test_unknown_feed_and_bad_filter_are_rejected() {
        let backend = MemoryBackend::new().with_feed("people", people());
        let options = QueryOptions::for_page(1, 5, Projection::new(), SortSpec::default());

        let err = backend
            .subscribe(
                SubscribeRequest {
                    name: "ghosts",
                    filters: &Filters::new(),
                    options: &options,
                },
                Box::new(|| {}),
            )
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));

        let bad = Filters::from(json!({"name": {"$regex": "p1"}}));
        let err = backend
            .subscribe(
                SubscribeRequest {
                    name: "people",
                    filters: &bad,
                    options: &options,
                },
                Box::new(|| {}),
            )
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
        assert_eq!(backend.active_subscriptions(), 0);
        assert_eq!(backend.requests().len(), 2);
    }

    #[test]
    fn test_unknown_scope_reads_empty() {
        let backend = MemoryBackend::new().with_feed("people", people());
        let find = FindOptions {
            fields: Projection::new(),
            sort: SortSpec::default(),
            debug: false,
        };
        let selector = ScopeSelector::for_subscription(&SubscriptionId::new("nope"));
        assert!(backend.find(&selector, &find).unwrap().is_empty());
        assert_eq!(
            backend
                .count(&CountKey::for_subscription(&SubscriptionId::new("nope")))
                .unwrap(),
            None
        );
    }
}
