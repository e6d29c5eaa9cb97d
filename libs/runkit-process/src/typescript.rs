//! TypeScript compilation middleware for the node process runtime.
//!
//! Detects `.ts`/`.tsx` sources by filename, compiles them with the `tsc`
//! toolchain inside the shared workspace (installing it on first use) and
//! substitutes the emitted JavaScript into the execution context.

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use runkit::{ExecutionContext, Middleware, SandboxError};

use crate::runtime::ProcessRuntime;

const TSC_BIN: &str = "./node_modules/typescript/bin/tsc";
const OUT_DIR: &str = "dist";

/// Compiles TypeScript sources to JavaScript before execution.
///
/// Non-TypeScript contexts pass through unchanged. On success the context's
/// `code` holds the emitted JavaScript, the filename extension is rewritten
/// to `.js`, and metadata records `original_filename` and `compiled: true`
/// for downstream steps and the executor.
#[derive(Debug, Default)]
pub struct TypeScriptCompile;

impl TypeScriptCompile {
    pub fn new() -> Self {
        Self
    }

    async fn ensure_compiler(&self, rt: &ProcessRuntime) -> Result<()> {
        if rt.file_exists(TSC_BIN).await {
            return Ok(());
        }
        tracing::info!("typescript toolchain missing; installing");
        let result = rt
            .spawn("npm", &["install", "typescript", "@types/node"])
            .await?;
        if !result.success() {
            return Err(anyhow!(
                "failed to install typescript toolchain (exit {}): {}",
                result.exit_code,
                result.output
            ));
        }
        Ok(())
    }

    /// Write a default `tsconfig.json` unless one already exists.
    async fn ensure_tsconfig(&self, rt: &ProcessRuntime) -> Result<()> {
        if rt.file_exists("tsconfig.json").await {
            return Ok(());
        }
        rt.write_file("tsconfig.json", &default_tsconfig()).await
    }

    async fn compile(&self, rt: &ProcessRuntime, ctx: &ExecutionContext) -> Result<String> {
        rt.write_file(&ctx.filename, &ctx.code).await?;

        let result = rt
            .spawn(
                "node",
                &[
                    TSC_BIN,
                    ctx.filename.as_str(),
                    "--outDir",
                    OUT_DIR,
                    "--target",
                    "ES2020",
                    "--module",
                    "CommonJS",
                ],
            )
            .await?;
        if !result.success() {
            return Err(anyhow!(
                "tsc exited with {}: {}",
                result.exit_code,
                result.output
            ));
        }

        let emitted = format!("{OUT_DIR}/{}", rewrite_extension(base_name(&ctx.filename)));
        rt.read_file(&emitted).await
    }
}

#[async_trait]
impl Middleware for TypeScriptCompile {
    async fn process(&self, mut ctx: ExecutionContext) -> Result<ExecutionContext, SandboxError> {
        if !is_typescript(&ctx.filename) {
            return Ok(ctx);
        }

        let rt = ProcessRuntime::from_handle(&ctx.handle).ok_or_else(|| {
            SandboxError::compile_failed(
                ctx.filename.clone(),
                anyhow!("typescript compilation requires a process runtime"),
            )
        })?;

        self.ensure_compiler(rt)
            .await
            .map_err(|e| SandboxError::compile_failed(ctx.filename.clone(), e))?;
        self.ensure_tsconfig(rt)
            .await
            .map_err(|e| SandboxError::compile_failed(ctx.filename.clone(), e))?;

        let compiled = self
            .compile(rt, &ctx)
            .await
            .map_err(|e| SandboxError::compile_failed(ctx.filename.clone(), e))?;

        let emitted_name = rewrite_extension(&ctx.filename);
        let original = std::mem::replace(&mut ctx.filename, emitted_name);
        ctx.code = compiled;
        ctx.set_meta("original_filename", original);
        ctx.set_meta("compiled", true);
        Ok(ctx)
    }
}

fn is_typescript(filename: &str) -> bool {
    filename.ends_with(".ts") || filename.ends_with(".tsx")
}

fn base_name(filename: &str) -> &str {
    filename.rsplit('/').next().unwrap_or(filename)
}

/// Rewrite a `.ts`/`.tsx` filename to its `.js` counterpart.
fn rewrite_extension(filename: &str) -> String {
    if let Some(stem) = filename.strip_suffix(".tsx") {
        return format!("{stem}.js");
    }
    if let Some(stem) = filename.strip_suffix(".ts") {
        return format!("{stem}.js");
    }
    filename.to_string()
}

fn default_tsconfig() -> String {
    let config = serde_json::json!({
        "compilerOptions": {
            "target": "ES2020",
            "module": "CommonJS",
            "outDir": "./dist",
            "rootDir": "./",
            "strict": true,
            "esModuleInterop": true,
            "skipLibCheck": true,
            "forceConsistentCasingInFileNames": true,
            "moduleResolution": "node",
        },
        "include": ["*.ts"],
        "exclude": ["node_modules", "dist"],
    });
    serde_json::to_string_pretty(&config).expect("static tsconfig serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use runkit::{Handle, RuntimeHandle};
    use std::sync::Arc;

    struct NotAProcessRuntime;
    impl RuntimeHandle for NotAProcessRuntime {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn detects_typescript_filenames() {
        assert!(is_typescript("main.ts"));
        assert!(is_typescript("component.tsx"));
        assert!(is_typescript("src/nested/app.ts"));
        assert!(!is_typescript("main.js"));
        assert!(!is_typescript("script.python.py"));
    }

    #[test]
    fn rewrites_extensions_preserving_paths() {
        assert_eq!(rewrite_extension("x.ts"), "x.js");
        assert_eq!(rewrite_extension("ui/app.tsx"), "ui/app.js");
        assert_eq!(rewrite_extension("plain.js"), "plain.js");
        assert_eq!(base_name("src/deep/x.ts"), "x.ts");
    }

    #[test]
    fn default_tsconfig_has_expected_shape() {
        let config: serde_json::Value = serde_json::from_str(&default_tsconfig()).unwrap();
        assert_eq!(config["compilerOptions"]["target"], "ES2020");
        assert_eq!(config["compilerOptions"]["module"], "CommonJS");
        assert_eq!(config["exclude"][0], "node_modules");
    }

    #[tokio::test]
    async fn javascript_contexts_pass_through_unchanged() {
        let handle: Handle = Arc::new(NotAProcessRuntime);
        let ctx = ExecutionContext::new("console.log(1)", "main.js", handle);

        let out = TypeScriptCompile::new().process(ctx).await.unwrap();
        assert_eq!(out.code, "console.log(1)");
        assert_eq!(out.filename, "main.js");
        assert!(out.metadata.is_empty());
    }

    #[tokio::test]
    async fn typescript_context_requires_a_process_runtime() {
        let handle: Handle = Arc::new(NotAProcessRuntime);
        let ctx = ExecutionContext::new("const x: number = 1", "main.ts", handle);

        let err = TypeScriptCompile::new().process(ctx).await.unwrap_err();
        match err {
            SandboxError::CompileFailed { filename, .. } => assert_eq!(filename, "main.ts"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    // Needs node + npm and network access for the toolchain install.
    #[cfg(feature = "toolchain-tests")]
    #[tokio::test]
    async fn compiles_typescript_and_stamps_metadata() {
        let rt = ProcessRuntime::create("node").unwrap();
        let handle: Handle = Arc::new(rt);
        let ctx = ExecutionContext::new(
            "const greeting: string = 'hi';\nconsole.log(greeting);",
            "x.ts",
            handle,
        );

        let out = TypeScriptCompile::new().process(ctx).await.unwrap();
        assert_eq!(out.filename, "x.js");
        assert!(out.code.contains("greeting"));
        assert_eq!(out.meta("original_filename").unwrap(), "x.ts");
        assert_eq!(out.meta("compiled").unwrap(), &serde_json::Value::Bool(true));
    }
}
