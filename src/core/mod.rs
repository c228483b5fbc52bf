pub mod error;
pub mod types;
pub mod value;

pub use error::{PagerError, Result, TransportError};
pub use types::{
    CountKey, FindOptions, Filters, ID_FIELD, Projection, QueryOptions, Record, ScopeSelector,
    SortDirection, SortSpec, SubscriptionId,
};
pub use value::ParamValue;
