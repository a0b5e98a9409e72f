use anyhow::{Context, Result};
use tokio::fs;

use super::process::Invocation;
use super::runner::{LanguageRunner, RunContext, outcome_from};
use super::workspace::Workspace;
use super::{Language, RunOutcome};

/// Runs submissions with a Python interpreter in a fresh workspace
#[derive(Debug, Clone)]
pub struct PythonRunner {
    interpreter: String,
}

impl PythonRunner {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl LanguageRunner for PythonRunner {
    async fn execute(&self, ctx: &RunContext, code: &str, stdin: &str) -> Result<RunOutcome> {
        let workspace = Workspace::allocate(&ctx.workspace_root, &Language::Python)
            .context("Failed to allocate workspace")?;

        let source_name = format!("{}.py", workspace.token());
        fs::write(workspace.file(&source_name), code)
            .await
            .context("Failed to write source file")?;

        let invocation = Invocation::new(&self.interpreter)
            .arg(&source_name)
            .current_dir(workspace.dir())
            .stdin(stdin)
            .timeout(ctx.timeout);
        let outcome = outcome_from(ctx.run(invocation).await);

        workspace.release();
        Ok(outcome)
    }
}
