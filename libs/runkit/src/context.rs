//! Per-run execution context threaded through the middleware pipeline.

use std::collections::HashMap;

use crate::driver::Handle;

/// The mutable record one `run` call threads through the transform pipeline
/// and finally hands to the backend executor.
///
/// Middlewares may rewrite `code` and `filename` and attach metadata for
/// downstream steps; the context is created fresh per run and discarded after
/// the executor returns.
#[derive(Clone)]
pub struct ExecutionContext {
    pub code: String,
    pub filename: String,
    pub handle: Handle,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ExecutionContext {
    pub fn new(code: impl Into<String>, filename: impl Into<String>, handle: Handle) -> Self {
        Self {
            code: code.into(),
            filename: filename.into(),
            handle,
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry for downstream steps or the executor.
    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn meta(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("filename", &self.filename)
            .field("code_len", &self.code.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}
