// ============================================================================
// livepage Library
// ============================================================================
//
// Reactive pagination over live data feeds: a parameter store, an effect
// that keeps one subscription in step with it, total-count tracking with
// page clamping, and a synchronous page read against the local cache.
//
// ============================================================================

pub mod backend;
pub mod config;
pub mod core;
pub mod pagination;
pub mod store;

// Re-export main types for convenience
pub use crate::backend::{
    CountSource, LocalCache, MemoryBackend, ReadyCallback, SubscribeRequest, SubscriptionHandle,
    Transport,
};
pub use crate::config::PaginationConfig;
pub use crate::core::{
    Filters, PagerError, Projection, QueryOptions, Record, Result, SortDirection, SortSpec,
    SubscriptionId, TransportError,
};
pub use crate::pagination::{PaginationController, PaginationControllerBuilder, QueryTrace};
pub use crate::store::{ParamKey, ParameterStore};
