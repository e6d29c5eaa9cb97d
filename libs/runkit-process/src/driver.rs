//! Process-backed runtime drivers: boot a shared workspace, seed it per
//! instance, run source files through a local interpreter.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use runkit::{ExecOutput, ExecutionContext, Handle, RuntimeDriver, SandboxError};

use crate::runtime::ProcessRuntime;

/// Per-instance setup applied by `initialize` against the shared runtime:
/// seed files, a generated manifest, packages to preinstall and an optional
/// working subdirectory.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Files written into the workspace on create (path -> contents).
    pub files: HashMap<String, String>,
    /// Entries merged over the driver's default manifest (node: package.json).
    pub manifest: serde_json::Map<String, serde_json::Value>,
    /// Packages installed on create via the driver's installer command.
    pub packages: Vec<String>,
    /// Directory created inside the workspace on create (succeeds if present).
    pub home_dir: Option<String>,
}

struct InstallerCommand {
    program: &'static str,
    args: &'static [&'static str],
}

/// `RuntimeDriver` for interpreter-backed kinds.
///
/// One booted [`ProcessRuntime`] workspace is shared by every sandbox of the
/// same kind; `execute` writes the (pipeline-transformed) source into the
/// workspace and runs it with the configured interpreter, returning the
/// captured combined output.
pub struct ProcessDriver {
    kind: &'static str,
    program: &'static str,
    default_filename: &'static str,
    installer: Option<InstallerCommand>,
    manifest_file: Option<&'static str>,
    options: RuntimeOptions,
}

impl ProcessDriver {
    /// JavaScript/TypeScript kind: runs files with `node`, installs packages
    /// with `npm install`, seeds a `package.json` manifest.
    pub fn node(options: RuntimeOptions) -> Arc<dyn RuntimeDriver> {
        Arc::new(Self {
            kind: "node",
            program: "node",
            default_filename: "main.js",
            installer: Some(InstallerCommand {
                program: "npm",
                args: &["install"],
            }),
            manifest_file: Some("package.json"),
            options,
        })
    }

    /// Python kind: runs files with `python3`, installs packages with pip.
    pub fn python(options: RuntimeOptions) -> Arc<dyn RuntimeDriver> {
        Arc::new(Self {
            kind: "python",
            program: "python3",
            default_filename: "main.py",
            installer: Some(InstallerCommand {
                program: "python3",
                args: &["-m", "pip", "install"],
            }),
            manifest_file: None,
            options,
        })
    }

    /// Arbitrary interpreter, mostly useful for tests and unusual toolchains.
    pub fn custom(
        kind: &'static str,
        program: &'static str,
        default_filename: &'static str,
        options: RuntimeOptions,
    ) -> Arc<dyn RuntimeDriver> {
        Arc::new(Self {
            kind,
            program,
            default_filename,
            installer: None,
            manifest_file: None,
            options,
        })
    }

    fn runtime<'a>(&self, handle: &'a Handle) -> Result<&'a ProcessRuntime> {
        ProcessRuntime::from_handle(handle)
            .ok_or_else(|| anyhow!("handle for kind '{}' is not a process runtime", self.kind))
    }

    /// Default manifest merged under caller-supplied entries.
    fn manifest_contents(&self) -> Result<String> {
        let mut manifest = serde_json::Map::new();
        manifest.insert("name".into(), "sandbox-project".into());
        manifest.insert("type".into(), "module".into());
        manifest.insert(
            "dependencies".into(),
            serde_json::Value::Object(Default::default()),
        );
        for (key, value) in &self.options.manifest {
            manifest.insert(key.clone(), value.clone());
        }
        serde_json::to_string_pretty(&serde_json::Value::Object(manifest))
            .context("serializing manifest")
    }

    async fn seed_workspace(&self, rt: &ProcessRuntime) -> Result<()> {
        if let Some(manifest_file) = self.manifest_file {
            rt.write_file(manifest_file, &self.manifest_contents()?)
                .await?;
        }
        if let Some(home) = &self.options.home_dir {
            rt.ensure_dir(home).await?;
        }
        for (path, contents) in &self.options.files {
            rt.write_file(path, contents).await?;
        }
        if let Some(installer) = &self.installer {
            for package in &self.options.packages {
                rt.install_package(installer.program, installer.args, package)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RuntimeDriver for ProcessDriver {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn default_filename(&self) -> &'static str {
        self.default_filename
    }

    fn validate_environment(&self) -> Result<(), SandboxError> {
        if find_on_path(self.program).is_none() {
            return Err(SandboxError::environment_unsupported(
                self.kind,
                anyhow!("interpreter '{}' not found on PATH", self.program),
            ));
        }
        Ok(())
    }

    async fn boot(&self) -> Result<Handle, SandboxError> {
        let runtime = ProcessRuntime::create(self.kind)
            .map_err(|e| SandboxError::boot_failed(self.kind, e))?;
        tracing::info!(kind = self.kind, program = self.program, "process runtime booted");
        Ok(Arc::new(runtime))
    }

    async fn teardown(&self, handle: Handle) -> Result<(), SandboxError> {
        let rt = self
            .runtime(&handle)
            .map_err(|e| SandboxError::teardown_failed(self.kind, e))?;
        rt.close()
            .map_err(|e| SandboxError::teardown_failed(self.kind, e))
    }

    async fn initialize(&self, handle: &Handle) -> Result<(), SandboxError> {
        let rt = self
            .runtime(handle)
            .map_err(|e| SandboxError::init_failed(self.kind, e))?;
        self.seed_workspace(rt)
            .await
            .map_err(|e| SandboxError::init_failed(self.kind, e))
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<ExecOutput, SandboxError> {
        let rt = self.runtime(&ctx.handle).map_err(|e| {
            SandboxError::ExecutionFailed {
                exit_code: -1,
                output: format!("{e:#}"),
            }
        })?;

        let run = async {
            rt.write_file(&ctx.filename, &ctx.code).await?;
            rt.spawn(self.program, &[ctx.filename.as_str()]).await
        };
        let result = run.await.map_err(|e| SandboxError::ExecutionFailed {
            exit_code: -1,
            output: format!("{e:#}"),
        })?;

        if !result.success() {
            return Err(SandboxError::ExecutionFailed {
                exit_code: result.exit_code,
                output: result.output,
            });
        }
        Ok(ExecOutput::new(result.output))
    }
}

/// Resolve a program name against PATH, honoring absolute paths as-is.
fn find_on_path(program: &str) -> Option<PathBuf> {
    let candidate = PathBuf::from(program);
    if candidate.is_absolute() {
        return candidate.is_file().then_some(candidate);
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|full| full.is_file())
}
