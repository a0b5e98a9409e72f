use anyhow::{Context, Result};
use tokio::fs;

use super::process::Invocation;
use super::runner::{LanguageRunner, RunContext, outcome_from};
use super::workspace::Workspace;
use super::{Language, RunOutcome};

const HARNESS_NAME: &str = "harness.cjs";

/// Evaluates the submission in a fresh `vm` context whose only global
/// binding is a console that records lines. The console and its buffer are
/// created inside the context so no host-realm object is reachable from the
/// submitted code. Recorded lines go to stdout on success; a thrown error's
/// message goes to stderr with exit code 1.
const HARNESS: &str = r#"'use strict';
const fs = require('fs');
const vm = require('vm');

const source = fs.readFileSync(process.argv[2], 'utf8');
const context = vm.createContext(Object.create(null));
const drain = vm.runInContext(`(() => {
  const lines = [];
  const format = (value) => {
    if (typeof value === 'string') return value;
    if (value !== null && typeof value === 'object') {
      try { return JSON.stringify(value); } catch (_) { return String(value); }
    }
    return String(value);
  };
  const record = (...args) => { lines.push(args.map(format).join(' ')); };
  globalThis.console = Object.freeze({
    log: record, info: record, debug: record, warn: record, error: record,
  });
  return () => lines.slice();
})()`, context);

let failed = false;
try {
  vm.runInContext(source, context, { filename: 'main.js' });
} catch (err) {
  let message;
  try {
    message = err !== null && typeof err === 'object' && 'message' in err
      ? String(err.message)
      : String(err);
  } catch (_) {
    message = 'Uncaught exception';
  }
  failed = true;
  process.stderr.write(message);
  process.exitCode = 1;
}

if (!failed) {
  process.stdout.write(Array.from(drain(), (line) => String(line)).join('\n'));
}
"#;

/// Runs submissions through Node.js in a restricted `vm` context
#[derive(Debug, Clone)]
pub struct JavaScriptRunner {
    runtime: String,
}

impl JavaScriptRunner {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
        }
    }
}

impl LanguageRunner for JavaScriptRunner {
    /// `stdin` is not exposed: the console is the only binding the code sees
    async fn execute(&self, ctx: &RunContext, code: &str, _stdin: &str) -> Result<RunOutcome> {
        let workspace = Workspace::allocate(&ctx.workspace_root, &Language::JavaScript)
            .context("Failed to allocate workspace")?;

        let source_name = format!("{}.js", workspace.token());
        fs::write(workspace.file(&source_name), code)
            .await
            .context("Failed to write source file")?;
        fs::write(workspace.file(HARNESS_NAME), HARNESS)
            .await
            .context("Failed to write harness")?;

        let invocation = Invocation::new(&self.runtime)
            .arg(HARNESS_NAME)
            .arg(&source_name)
            .current_dir(workspace.dir())
            .timeout(ctx.timeout);
        let outcome = outcome_from(ctx.run(invocation).await);

        workspace.release();
        Ok(outcome)
    }
}
