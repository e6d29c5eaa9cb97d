//! Process-backed runtime drivers for `runkit` sandboxes.
//!
//! A [`ProcessRuntime`] is a shared scratch workspace in which source files
//! are materialized and interpreter subprocesses run with captured output.
//! [`ProcessDriver`] plugs it into the `runkit` lifecycle as the "node" and
//! "python" backend kinds; [`TypeScriptCompile`] is the pipeline step that
//! compiles `.ts`/`.tsx` sources to JavaScript inside the workspace before
//! execution.

pub mod driver;
pub mod runtime;
pub mod typescript;

pub use driver::{ProcessDriver, RuntimeOptions};
pub use runtime::{CommandOutput, ProcessRuntime};
pub use typescript::TypeScriptCompile;
