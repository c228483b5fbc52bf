//! Debug side channel for computed queries.

use std::fmt;
use std::rc::Rc;

use serde::Serialize;

/// A query the controller is about to issue, captured when debug is on.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryTrace {
    Subscribe {
        name: String,
        filters: String,
        options: String,
    },
    Find {
        name: String,
        selector: String,
        options: String,
    },
}

impl QueryTrace {
    pub fn subscribe(name: &str, filters: &impl Serialize, options: &impl Serialize) -> Self {
        Self::Subscribe {
            name: name.to_string(),
            filters: to_json(filters),
            options: to_json(options),
        }
    }

    pub fn find(name: &str, selector: &impl Serialize, options: &impl Serialize) -> Self {
        Self::Find {
            name: name.to_string(),
            selector: to_json(selector),
            options: to_json(options),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Subscribe { name, .. } | Self::Find { name, .. } => name,
        }
    }
}

impl fmt::Display for QueryTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribe {
                name,
                filters,
                options,
            } => write!(f, "Pagination {name} subscribe {filters} {options}"),
            Self::Find {
                name,
                selector,
                options,
            } => write!(f, "Pagination {name} find {selector} {options}"),
        }
    }
}

fn to_json(value: &impl Serialize) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

/// Receives query traces.
pub type TraceHook = Rc<dyn Fn(&QueryTrace)>;

/// Hook used when none is configured: one `tracing` debug event per query.
pub fn log_trace(trace: &QueryTrace) {
    match trace {
        QueryTrace::Subscribe {
            name,
            filters,
            options,
        } => tracing::debug!(feed = %name, filters = %filters, options = %options, "subscribe"),
        QueryTrace::Find {
            name,
            selector,
            options,
        } => tracing::debug!(feed = %name, selector = %selector, options = %options, "find"),
    }
}

pub fn default_hook() -> TraceHook {
    Rc::new(log_trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_matches_log_line_shape() {
        let trace = QueryTrace::subscribe("tasks", &json!({"a": 1}), &json!({"skip": 0}));
        assert_eq!(trace.to_string(), r#"Pagination tasks subscribe {"a":1} {"skip":0}"#);
        assert_eq!(trace.name(), "tasks");
    }
}
