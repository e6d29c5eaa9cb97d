//! Process runtime handle: a scratch workspace directory plus subprocess
//! spawning with captured output.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::process::Command;

use runkit::{Handle, RuntimeHandle};

/// Captured result of one subprocess invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit code; -1 when the process was killed by a signal.
    pub exit_code: i32,
    /// Combined stdout + stderr.
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The booted runtime shared by all sandbox instances of one process-backed
/// kind: an isolated workspace directory in which files are materialized and
/// interpreter subprocesses run.
///
/// The workspace is owned by the lifecycle registry through the [`Handle`];
/// teardown closes it, after which all file and spawn operations fail.
pub struct ProcessRuntime {
    kind: &'static str,
    workspace: Mutex<Option<TempDir>>,
}

impl ProcessRuntime {
    pub(crate) fn create(kind: &'static str) -> Result<Self> {
        let workspace = tempfile::Builder::new()
            .prefix("runkit-")
            .tempdir()
            .context("creating runtime workspace directory")?;
        tracing::debug!(kind, path = %workspace.path().display(), "process runtime workspace created");
        Ok(Self {
            kind,
            workspace: Mutex::new(Some(workspace)),
        })
    }

    /// Recover the concrete runtime from an opaque handle.
    pub fn from_handle(handle: &Handle) -> Option<&ProcessRuntime> {
        handle.as_any().downcast_ref::<ProcessRuntime>()
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    fn root(&self) -> Result<PathBuf> {
        match self.workspace.lock().as_ref() {
            Some(dir) => Ok(dir.path().to_path_buf()),
            None => bail!("process runtime '{}' has been torn down", self.kind),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        Ok(self.root()?.join(path))
    }

    /// Write a file into the workspace, creating parent directories.
    pub async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating parent directories for '{path}'"))?;
        }
        tokio::fs::write(&full, contents)
            .await
            .with_context(|| format!("writing '{path}'"))
    }

    pub async fn read_file(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .with_context(|| format!("reading '{path}'"))
    }

    pub async fn file_exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(full) => tokio::fs::try_exists(&full).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Create a directory inside the workspace; succeeds if it already
    /// exists. This is a named fallback policy, not a swallowed error.
    pub async fn ensure_dir(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .with_context(|| format!("creating directory '{path}'"))
    }

    /// Spawn a subprocess inside the workspace and collect its combined
    /// output and exit status.
    pub async fn spawn(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let root = self.root()?;
        tracing::debug!(kind = self.kind, program, ?args, "spawning workspace process");

        let out = Command::new(program)
            .args(args)
            .current_dir(&root)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn process: {program}"))?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        let exit_code = out.status.code().unwrap_or(-1);

        Ok(CommandOutput { exit_code, output })
    }

    /// Install a package with the given installer command line
    /// (e.g. `npm install <name>`).
    pub async fn install_package(&self, installer: &str, args: &[&str], name: &str) -> Result<()> {
        let mut full_args: Vec<&str> = args.to_vec();
        full_args.push(name);
        let result = self.spawn(installer, &full_args).await?;
        if !result.success() {
            bail!(
                "failed to install package '{}' (exit {}): {}",
                name,
                result.exit_code,
                result.output
            );
        }
        Ok(())
    }

    /// Close the workspace directory, releasing its files.
    pub(crate) fn close(&self) -> Result<()> {
        if let Some(dir) = self.workspace.lock().take() {
            dir.close().context("removing runtime workspace directory")?;
        }
        Ok(())
    }
}

impl RuntimeHandle for ProcessRuntime {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl std::fmt::Debug for ProcessRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRuntime")
            .field("kind", &self.kind)
            .field("live", &self.workspace.lock().is_some())
            .finish()
    }
}
