//! # runkit - shared-runtime code execution sandboxes
//!
//! Backends that are expensive to boot (a process runtime, an interpreted
//! language runtime) are exposed behind a uniform lifecycle API: construct a
//! [`Sandbox`], `create()` it, `run()` code through a middleware pipeline,
//! `destroy()` it. Multiple sandboxes of the same backend kind share one
//! booted runtime; the [`LifecycleRegistry`] deduplicates concurrent boots,
//! reference-counts holders and tears the runtime down exactly once when the
//! last holder releases.
//!
//! ```rust,ignore
//! let registry = Arc::new(LifecycleRegistry::new());
//! let mut sandbox = Sandbox::new(driver, registry);
//! sandbox.use_middleware(Arc::new(TypeScriptCompile::new()));
//! sandbox.create().await?;
//! let out = sandbox.run("console.log('hi')", Some("main.ts")).await?;
//! sandbox.destroy().await?;
//! ```

pub mod context;
pub mod driver;
pub mod errors;
pub mod lifecycle;
pub mod middleware;
pub mod sandbox;

pub use context::ExecutionContext;
pub use driver::{ExecOutput, Handle, RuntimeDriver, RuntimeHandle};
pub use errors::SandboxError;
pub use lifecycle::LifecycleRegistry;
pub use middleware::Middleware;
pub use sandbox::Sandbox;
