//! Sandbox instance - a caller's session with a shared backend runtime.

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::driver::{ExecOutput, Handle, RuntimeDriver};
use crate::errors::SandboxError;
use crate::lifecycle::LifecycleRegistry;
use crate::middleware::Middleware;

/// A user-facing handle wrapping one lifecycle-registry acquisition and an
/// ordered list of middlewares.
///
/// State machine: Uncreated -> Created -> Destroyed (terminal). Repeated
/// `create()` while created is a no-op; no transition leaves Destroyed.
///
/// `run` takes `&mut self`: callers must serialize runs per sandbox, and the
/// borrow checker enforces exactly that. Independent sandboxes of the same
/// kind may run concurrently against the shared runtime.
pub struct Sandbox {
    driver: Arc<dyn RuntimeDriver>,
    registry: Arc<LifecycleRegistry>,
    middlewares: Vec<Arc<dyn Middleware>>,
    handle: Option<Handle>,
    created: bool,
    destroyed: bool,
    last_error: Option<SandboxError>,
}

impl Sandbox {
    pub fn new(driver: Arc<dyn RuntimeDriver>, registry: Arc<LifecycleRegistry>) -> Self {
        Self {
            driver,
            registry,
            middlewares: Vec::new(),
            handle: None,
            created: false,
            destroyed: false,
            last_error: None,
        }
    }

    /// Append a middleware to the execution pipeline. Steps run in the order
    /// they were registered.
    pub fn use_middleware(&mut self, step: Arc<dyn Middleware>) -> &mut Self {
        self.middlewares.push(step);
        self
    }

    pub fn kind(&self) -> &'static str {
        self.driver.kind()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// The most recently recorded failure for this sandbox, if any.
    pub fn last_error(&self) -> Option<&SandboxError> {
        self.last_error.as_ref()
    }

    /// Acquire the shared runtime (booting it if needed) and run the driver's
    /// one-time per-instance initialization.
    ///
    /// Idempotent while created. Fails with `AlreadyDestroyed` after
    /// `destroy()`. A failed initialization releases the acquisition again:
    /// `destroy()` on a never-created sandbox does not touch the lifecycle
    /// record, so keeping the holder counted would leak it permanently.
    pub async fn create(&mut self) -> Result<(), SandboxError> {
        if self.destroyed {
            return Err(self.record(SandboxError::AlreadyDestroyed));
        }
        if self.created {
            return Ok(());
        }

        let handle = match self.registry.acquire(&self.driver).await {
            Ok(handle) => handle,
            Err(err) => return Err(self.record(err)),
        };

        if let Err(err) = self.driver.initialize(&handle).await {
            if let Err(release_err) = self.registry.release(self.driver.as_ref()).await {
                tracing::warn!(
                    kind = self.driver.kind(),
                    error = %release_err,
                    "release after failed initialization also failed"
                );
            }
            return Err(self.record(err));
        }

        self.handle = Some(handle);
        self.created = true;
        tracing::debug!(kind = self.driver.kind(), "sandbox created");
        Ok(())
    }

    /// Release this sandbox's hold on the shared runtime and move to the
    /// terminal destroyed state.
    ///
    /// Destruction is best-effort: the sandbox is marked destroyed even when
    /// the release fails, and the failure is surfaced afterwards. Idempotent.
    pub async fn destroy(&mut self) -> Result<(), SandboxError> {
        let released = if self.created && self.handle.is_some() {
            self.registry.release(self.driver.as_ref()).await
        } else {
            Ok(())
        };

        self.handle = None;
        self.created = false;
        self.destroyed = true;
        tracing::debug!(kind = self.driver.kind(), "sandbox destroyed");

        released.map_err(|err| self.record(err))
    }

    /// Run source through the middleware pipeline and the backend executor.
    ///
    /// `filename` defaults to the driver's conventional entry filename.
    /// Pipeline or executor failures propagate without touching lifecycle
    /// state; the sandbox stays created and reusable.
    pub async fn run(
        &mut self,
        code: &str,
        filename: Option<&str>,
    ) -> Result<ExecOutput, SandboxError> {
        if self.destroyed {
            return Err(self.record(SandboxError::AlreadyDestroyed));
        }
        let Some(handle) = self.handle.clone() else {
            return Err(self.record(SandboxError::NotCreated));
        };

        let filename = filename.unwrap_or_else(|| self.driver.default_filename());
        let mut ctx = ExecutionContext::new(code, filename, handle);

        for step in &self.middlewares {
            ctx = match step.process(ctx).await {
                Ok(ctx) => ctx,
                Err(err) => return Err(self.record(err)),
            };
        }

        match self.driver.execute(ctx).await {
            Ok(output) => Ok(output),
            Err(err) => Err(self.record(err)),
        }
    }

    fn record(&mut self, err: SandboxError) -> SandboxError {
        self.last_error = Some(err.clone());
        err
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("kind", &self.driver.kind())
            .field("created", &self.created)
            .field("destroyed", &self.destroyed)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}
