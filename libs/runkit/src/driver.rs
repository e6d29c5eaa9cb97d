//! Backend driver contract: the capability interface each runtime kind
//! implements so the lifecycle registry and sandbox instances can stay
//! backend-agnostic.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::errors::SandboxError;

/// Opaque reference to a booted backend runtime.
///
/// The lifecycle registry owns the handle; sandbox instances and middlewares
/// hold non-owning clones. Backend-specific code recovers the concrete type
/// through `as_any` downcasting.
pub trait RuntimeHandle: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
}

impl std::fmt::Debug for dyn RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RuntimeHandle")
    }
}

pub type Handle = Arc<dyn RuntimeHandle>;

/// Captured result of executing a context against a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Combined captured output (stdout + stderr for process backends).
    pub output: String,
}

impl ExecOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

/// Pluggable boot/teardown/init/execute behavior for one backend kind.
///
/// Drivers are cheap, stateless descriptions of a backend; the expensive
/// shared runtime lives behind [`Handle`] and is managed by the
/// [`LifecycleRegistry`](crate::lifecycle::LifecycleRegistry). The `kind`
/// string is the stable sharing key: every driver reporting the same kind
/// shares one booted runtime.
#[async_trait]
pub trait RuntimeDriver: Send + Sync + 'static {
    /// Stable identity used as the sharing key (e.g. "node", "python").
    fn kind(&self) -> &'static str;

    /// Logical filename used when `run` is called without one.
    fn default_filename(&self) -> &'static str;

    /// Cheap precondition check, called before every acquisition.
    fn validate_environment(&self) -> Result<(), SandboxError>;

    /// Boot the shared runtime. Expensive; invoked at most once per kind
    /// while the previous boot has not failed.
    async fn boot(&self) -> Result<Handle, SandboxError>;

    /// Release backend resources. A failure must not prevent the lifecycle
    /// record from being cleared.
    async fn teardown(&self, handle: Handle) -> Result<(), SandboxError>;

    /// One-time post-boot setup per sandbox instance (e.g. seeding files).
    async fn initialize(&self, handle: &Handle) -> Result<(), SandboxError>;

    /// Run the final, pipeline-transformed context.
    async fn execute(&self, ctx: ExecutionContext) -> Result<ExecOutput, SandboxError>;
}
