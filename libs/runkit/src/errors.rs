//! Structured errors for sandbox lifecycle and execution.

use thiserror::Error;

/// Errors surfaced by the lifecycle registry, sandbox instances and the
/// execution pipeline.
///
/// The enum is `Clone` on purpose: a single failed boot attempt is broadcast
/// to every caller that joined the in-flight boot, and the same error is
/// retained as the per-kind / per-instance last error. Failure causes from
/// driver internals (which use `anyhow`) are rendered into the `message`
/// payload at the crate boundary via the constructor helpers below.
#[derive(Debug, Clone, Error)]
pub enum SandboxError {
    #[error("environment unsupported for runtime '{kind}': {message}")]
    EnvironmentUnsupported { kind: &'static str, message: String },

    #[error("boot failed for runtime '{kind}': {message}")]
    BootFailed { kind: &'static str, message: String },

    #[error("teardown failed for runtime '{kind}': {message}")]
    TeardownFailed { kind: &'static str, message: String },

    #[error("initialization failed for runtime '{kind}': {message}")]
    InitFailed { kind: &'static str, message: String },

    #[error("sandbox not created; call create() first")]
    NotCreated,

    #[error("sandbox has been destroyed")]
    AlreadyDestroyed,

    #[error("compilation failed for '{filename}': {message}")]
    CompileFailed { filename: String, message: String },

    #[error("execution failed with exit status {exit_code}\noutput: {output}")]
    ExecutionFailed { exit_code: i32, output: String },
}

/// Render a cause chain into a single message (alternate anyhow formatting).
fn render(err: impl Into<anyhow::Error>) -> String {
    let err: anyhow::Error = err.into();
    format!("{err:#}")
}

impl SandboxError {
    pub fn environment_unsupported(kind: &'static str, err: impl Into<anyhow::Error>) -> Self {
        Self::EnvironmentUnsupported {
            kind,
            message: render(err),
        }
    }

    pub fn boot_failed(kind: &'static str, err: impl Into<anyhow::Error>) -> Self {
        Self::BootFailed {
            kind,
            message: render(err),
        }
    }

    pub fn teardown_failed(kind: &'static str, err: impl Into<anyhow::Error>) -> Self {
        Self::TeardownFailed {
            kind,
            message: render(err),
        }
    }

    pub fn init_failed(kind: &'static str, err: impl Into<anyhow::Error>) -> Self {
        Self::InitFailed {
            kind,
            message: render(err),
        }
    }

    pub fn compile_failed(filename: impl Into<String>, err: impl Into<anyhow::Error>) -> Self {
        Self::CompileFailed {
            filename: filename.into(),
            message: render(err),
        }
    }
}
