use serde::Deserialize;

use crate::core::{Filters, PagerError, Projection, Result, SortSpec};

/// Pagination controller configuration
///
/// Every field except `name` has a default; `name` identifies the remote
/// feed and is fixed for the lifetime of the controller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaginationConfig {
    /// Remote feed identifier
    pub name: String,

    /// Initial 1-based page
    pub page: u64,

    /// Records per page
    pub per_page: u64,

    /// Server-side constraints
    pub filters: Filters,

    /// Projection applied remotely and locally
    pub fields: Projection,

    /// Ordering applied remotely and locally
    pub sort: SortSpec,

    /// Emit query traces
    pub debug: bool,

    /// Stop a subscription as soon as a newer one replaces it
    pub release_superseded: bool,
}

impl PaginationConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    pub fn per_page(mut self, per_page: u64) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn filters(mut self, filters: impl Into<Filters>) -> Self {
        self.filters = filters.into();
        self
    }

    pub fn fields(mut self, fields: Projection) -> Self {
        self.fields = fields;
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn release_superseded(mut self, release: bool) -> Self {
        self.release_superseded = release;
        self
    }

    /// Parse from a JSON document, e.g. `{"name": "tasks", "perPage": 25}`
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PagerError::configuration(format!("invalid configuration: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PagerError::configuration("name cannot be empty"));
        }

        if self.page == 0 {
            return Err(PagerError::configuration("page must be >= 1"));
        }

        if self.per_page == 0 {
            return Err(PagerError::configuration("per_page must be > 0"));
        }

        Ok(())
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            page: 1,
            per_page: 10,
            filters: Filters::new(),
            fields: Projection::new(),
            sort: SortSpec::default(),
            debug: false,
            release_superseded: false,
        }
    }
}
