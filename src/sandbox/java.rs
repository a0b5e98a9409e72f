use std::sync::LazyLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use regex::Regex;
use tokio::fs;

use super::process::Invocation;
use super::runner::{LanguageRunner, RunContext, outcome_from};
use super::workspace::Workspace;
use super::{Language, RunOutcome};

const DEFAULT_CLASS_NAME: &str = "Main";

static PUBLIC_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"public\s+class\s+([A-Za-z_$][A-Za-z0-9_$]*)").expect("valid class pattern")
});

/// Finds the class `javac` will require the source file to be named after
pub fn public_class_name(code: &str) -> &str {
    PUBLIC_CLASS
        .captures(code)
        .and_then(|caps| caps.get(1))
        .map_or(DEFAULT_CLASS_NAME, |m| m.as_str())
}

/// Compiles with `javac`, then runs the class with `java`
///
/// Each phase gets the per-process timeout. `total_timeout` additionally
/// caps both phases together when set.
#[derive(Debug, Clone)]
pub struct JavaRunner {
    compiler: String,
    runtime: String,
    total_timeout: Option<Duration>,
}

impl JavaRunner {
    pub fn new(
        compiler: impl Into<String>,
        runtime: impl Into<String>,
        total_timeout: Option<Duration>,
    ) -> Self {
        Self {
            compiler: compiler.into(),
            runtime: runtime.into(),
            total_timeout,
        }
    }

    fn run_budget(&self, per_process: Duration, compile_started: Instant) -> Duration {
        match self.total_timeout {
            Some(total) => per_process.min(total.saturating_sub(compile_started.elapsed())),
            None => per_process,
        }
    }
}

impl LanguageRunner for JavaRunner {
    async fn execute(&self, ctx: &RunContext, code: &str, stdin: &str) -> Result<RunOutcome> {
        let class_name = public_class_name(code);
        let source_name = format!("{class_name}.java");

        let workspace = Workspace::allocate(&ctx.workspace_root, &Language::Java)
            .context("Failed to allocate workspace")?;
        fs::write(workspace.file(&source_name), code)
            .await
            .context("Failed to write source file")?;

        let started = Instant::now();
        let compile_timeout = match self.total_timeout {
            Some(total) => ctx.timeout.min(total),
            None => ctx.timeout,
        };
        let compile = Invocation::new(&self.compiler)
            .args(["-encoding", "UTF-8", "-d"])
            .arg(workspace.dir())
            .arg(&source_name)
            .current_dir(workspace.dir())
            .timeout(compile_timeout);

        match ctx.run(compile).await {
            Ok(output) if output.success() => {
                log::debug!("Compiled {source_name} in {}ms", output.elapsed.as_millis());
            }
            Ok(output) => {
                let diagnostics = if output.stderr.trim().is_empty() {
                    // Some javac builds print diagnostics on stdout
                    match output.stdout.trim() {
                        "" => output.failure_message(),
                        stdout => stdout.to_string(),
                    }
                } else {
                    output.failure_message()
                };
                log::info!("Compilation of {source_name} failed");
                workspace.release();
                return Ok(RunOutcome::error(diagnostics));
            }
            Err(e) => {
                workspace.release();
                return Ok(RunOutcome::error(e.to_string()));
            }
        }

        let budget = self.run_budget(ctx.timeout, started);
        let run = Invocation::new(&self.runtime)
            .arg("-cp")
            .arg(workspace.dir())
            .arg(class_name)
            .current_dir(workspace.dir())
            .stdin(stdin)
            .timeout(budget);
        let outcome = outcome_from(ctx.run(run).await);

        workspace.release();
        Ok(outcome)
    }
}
