//! Execution-transform pipeline.
//!
//! A middleware receives an [`ExecutionContext`] and returns a (possibly
//! modified) one. Steps run strictly in registration order; there is no
//! priority or topological sort. A step that does not apply to a given
//! context must pass it through unchanged.

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::errors::SandboxError;

/// One stage of the execution pipeline.
///
/// Steps may rewrite `code` and `filename` and attach metadata (e.g. "this
/// step compiled the source; here is the original filename") for downstream
/// steps or the final executor. A failing step aborts the remaining pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn process(&self, ctx: ExecutionContext) -> Result<ExecutionContext, SandboxError>;
}
