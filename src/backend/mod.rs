//! Boundaries to the external collaborators.
//!
//! The controller talks to three services it does not own: the remote
//! [`Transport`] that maintains live subscriptions, the client-side
//! [`LocalCache`] those subscriptions populate, and the [`CountSource`]
//! publishing total match counts. [`MemoryBackend`] implements all three
//! in-process.

pub mod filter;
pub mod memory;
pub mod sort;

use crate::core::{
    CountKey, Filters, FindOptions, QueryOptions, Record, ScopeSelector, SubscriptionId,
    TransportError,
};

pub use memory::MemoryBackend;

/// Completion callback for a subscription's initial delivery.
///
/// `FnOnce` makes the "invoked at most once" contract part of the type.
pub type ReadyCallback = Box<dyn FnOnce()>;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Everything a transport needs to open one subscription.
#[derive(Debug, Clone, Copy)]
pub struct SubscribeRequest<'a> {
    pub name: &'a str,
    pub filters: &'a Filters,
    pub options: &'a QueryOptions,
}

/// Handle returned for an opened subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
}

impl SubscriptionHandle {
    pub fn new(id: SubscriptionId) -> Self {
        Self { id }
    }

    pub fn subscription_id(&self) -> &SubscriptionId {
        &self.id
    }
}

pub trait Transport {
    /// Open a live subscription.
    ///
    /// `on_ready` must be invoked once the initial dataset has reached the
    /// local cache, and never again for this subscription.
    fn subscribe(
        &self,
        request: SubscribeRequest<'_>,
        on_ready: ReadyCallback,
    ) -> TransportResult<SubscriptionHandle>;

    /// Release a subscription. Unknown ids are ignored.
    fn stop(&self, _id: &SubscriptionId) {}
}

pub trait LocalCache {
    /// Synchronous snapshot of the records matching `selector`.
    fn find(&self, selector: &ScopeSelector, options: &FindOptions) -> TransportResult<Vec<Record>>;
}

pub trait CountSource {
    /// Total matching-record count, `None` when nothing is published under `key`.
    fn count(&self, key: &CountKey) -> TransportResult<Option<u64>>;
}
