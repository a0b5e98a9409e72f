use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use super::RunOutcome;
use super::process::{Invocation, ProcessError, ProcessOutput};

/// Shared settings every language runner executes under
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Parent directory of per-execution workspaces
    pub workspace_root: PathBuf,
    /// Limit for each spawned process
    pub timeout: Duration,
    /// Bytes each process may write to stdout and to stderr
    pub max_output_bytes: u64,
    /// Fired on shutdown to kill in-flight processes
    pub cancel: CancellationToken,
}

impl RunContext {
    pub async fn run(&self, invocation: Invocation) -> Result<ProcessOutput, ProcessError> {
        invocation
            .output_limit(self.max_output_bytes)
            .run(&self.cancel)
            .await
    }
}

/// Trait for the per-language execution pipelines
///
/// Implementations take submitted source and stdin through whatever
/// compile and run steps the language needs. Execution failures (compile
/// errors, crashes, timeouts, missing toolchains) are reported inside the
/// returned [`RunOutcome`]; `Err` is reserved for internal failures such as
/// being unable to create the workspace.
pub trait LanguageRunner: Send + Sync {
    fn execute(
        &self,
        ctx: &RunContext,
        code: &str,
        stdin: &str,
    ) -> impl Future<Output = Result<RunOutcome>> + Send;
}

/// Shapes the result of a single run step into an outcome
pub(super) fn outcome_from(result: Result<ProcessOutput, ProcessError>) -> RunOutcome {
    match result {
        Ok(output) if output.success() => RunOutcome::success(&output.stdout),
        Ok(output) => RunOutcome::failure(&output.stdout, output.failure_message()),
        Err(e) => RunOutcome::error(e.to_string()),
    }
}
