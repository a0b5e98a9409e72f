mod java;
mod javascript;
mod language;
pub mod process;
mod python;
mod runner;
mod workspace;

pub use java::{JavaRunner, public_class_name};
pub use javascript::JavaScriptRunner;
pub use language::Language;
pub use python::PythonRunner;
pub use runner::{LanguageRunner, RunContext};

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{ExecutionConfig, LanguagesConfig};
use process::Invocation;

/// Output reported when a program exits cleanly without printing anything
pub const NO_OUTPUT_SENTINEL: &str = "Program executed successfully with no output";

/// A validated request to run one program
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: Language,
    pub stdin: String,
}

/// What a language runner produced, before timing is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub output: String,
    pub error: Option<String>,
}

impl RunOutcome {
    /// Clean exit: trimmed stdout, or the sentinel if there was none
    pub fn success(stdout: &str) -> Self {
        let output = stdout.trim();
        Self {
            output: if output.is_empty() {
                NO_OUTPUT_SENTINEL.to_string()
            } else {
                output.to_string()
            },
            error: None,
        }
    }

    /// Failed run that may still have printed something
    pub fn failure(stdout: &str, error: impl Into<String>) -> Self {
        Self {
            output: stdout.trim().to_string(),
            error: Some(error.into()),
        }
    }

    /// Failure with no output at all
    pub fn error(error: impl Into<String>) -> Self {
        Self::failure("", error)
    }
}

/// Response body of an execution
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExecutionResult {
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
}

/// Dispatches requests to the runner of their language
///
/// Cloning is cheap; all clones share the runners and the concurrency limit.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    context: RunContext,
    javascript: JavaScriptRunner,
    python: PythonRunner,
    java: JavaRunner,
    permits: Semaphore,
}

impl Executor {
    pub fn new(
        execution: &ExecutionConfig,
        languages: &LanguagesConfig,
        cancel: CancellationToken,
    ) -> Self {
        let context = RunContext {
            workspace_root: execution.workspace_root(),
            timeout: execution.timeout(),
            max_output_bytes: execution.max_output_bytes,
            cancel,
        };

        Self {
            inner: Arc::new(ExecutorInner {
                context,
                javascript: JavaScriptRunner::new(&languages.javascript.runtime),
                python: PythonRunner::new(&languages.python.interpreter),
                java: JavaRunner::new(
                    &languages.java.compiler,
                    &languages.java.runtime,
                    languages.java.total_timeout(),
                ),
                permits: Semaphore::new(execution.max_concurrent),
            }),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.inner.context
    }

    /// Runs one request and times it
    ///
    /// Every execution failure comes back as a result with `error` set.
    /// `Err` means the service itself failed, e.g. the workspace could not
    /// be created.
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        let started = Instant::now();
        let ExecutionRequest {
            code,
            language,
            stdin,
        } = request;

        let _permit = self
            .inner
            .permits
            .acquire()
            .await
            .context("Execution limiter closed")?;
        log::debug!("Dispatching {language} execution");

        let ctx = &self.inner.context;
        let outcome = match &language {
            Language::JavaScript => self.inner.javascript.execute(ctx, &code, &stdin).await?,
            Language::Python => self.inner.python.execute(ctx, &code, &stdin).await?,
            Language::Java => self.inner.java.execute(ctx, &code, &stdin).await?,
            Language::Unsupported(name) => {
                RunOutcome::error(format!("Execution for {name} is not supported yet"))
            }
        };

        let execution_time_ms = started.elapsed().as_millis() as u64;
        match &outcome.error {
            None => log::info!("{language} execution succeeded in {execution_time_ms}ms"),
            Some(e) => log::info!("{language} execution failed in {execution_time_ms}ms: {e}"),
        }

        Ok(ExecutionResult {
            output: outcome.output,
            error: outcome.error,
            execution_time_ms,
        })
    }
}

/// Checks that every configured interpreter and compiler can be started
///
/// Missing tools are logged; the service still runs and reports the
/// missing tool to callers of that language.
pub async fn probe_toolchain(languages: &LanguagesConfig, cancel: &CancellationToken) {
    let tools = [
        (Language::JavaScript, &languages.javascript.runtime),
        (Language::Python, &languages.python.interpreter),
        (Language::Java, &languages.java.compiler),
        (Language::Java, &languages.java.runtime),
    ];

    for (language, tool) in tools {
        let probe = Invocation::new(tool)
            .arg("--version")
            .timeout(Duration::from_secs(5));
        match probe.run(cancel).await {
            Ok(output) if output.success() => {
                let version = format!("{}{}", output.stdout, output.stderr);
                let version = version.lines().next().unwrap_or_default().trim();
                log::info!("{language}: found `{tool}` ({version})");
            }
            Ok(output) => log::warn!(
                "{language}: `{tool} --version` failed: {}",
                output.failure_message()
            ),
            Err(e) => log::warn!("{language}: {e}"),
        }
    }
}
