//! Invocation-id to tool-call-id correlation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Shared map from sub-computation invocation id to the tool call that
/// spawned it.
///
/// Dispatch registers the mapping before the sub-computation can emit its
/// first event, so the adapter can attribute any namespaced event it sees.
/// The map is explicit shared state handed to both sides; there is no
/// global registry.
#[derive(Clone, Debug, Default)]
pub struct CorrelationMap {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl CorrelationMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an invocation as spawned by `tool_call_id`.
    pub fn register(&self, invocation_id: impl Into<String>, tool_call_id: impl Into<String>) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(invocation_id.into(), tool_call_id.into());
        }
    }

    /// Look up the tool call that spawned `invocation_id`.
    pub fn resolve(&self, invocation_id: &str) -> Option<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|map| map.get(invocation_id).cloned())
    }
}
