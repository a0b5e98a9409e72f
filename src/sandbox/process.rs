use std::ffi::OsString;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Wall-clock limit applied to a process when none is given
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes captured per stream when no limit is given
pub const DEFAULT_OUTPUT_LIMIT: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("`{program}` is not installed or not on PATH. Please install it to run this language")]
    NotInstalled { program: String },

    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Execution timed out after {}s", .limit.as_secs_f64())]
    TimedOut { program: String, limit: Duration },

    #[error("Output limit of {limit} bytes exceeded")]
    OutputLimitExceeded { program: String, limit: u64 },

    #[error("Execution of `{program}` was cancelled because the service is shutting down")]
    Cancelled { program: String },

    #[error("I/O error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything a finished process left behind
#[derive(Debug)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Message describing a failed run: stderr, or the exit status if the
    /// process said nothing
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match (self.status.code(), self.status.signal()) {
            (Some(code), _) => format!("Process exited with code {code}"),
            (None, Some(signal)) => format!("Process was terminated by signal {signal}"),
            (None, None) => "Process exited abnormally".to_string(),
        }
    }
}

/// One external program run to completion or to its deadline
#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    stdin: String,
    timeout: Duration,
    output_limit: u64,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            stdin: String::new(),
            timeout: DEFAULT_TIMEOUT,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = input.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Caps stdout and stderr separately; a process writing more is killed
    pub fn output_limit(mut self, bytes: u64) -> Self {
        self.output_limit = bytes;
        self
    }

    /// Spawns the program and waits for it, killing it on timeout or when
    /// `cancel` fires
    ///
    /// A non-zero exit is not an error here; callers inspect
    /// [`ProcessOutput::success`].
    pub async fn run(self, cancel: &CancellationToken) -> Result<ProcessOutput, ProcessError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ProcessError::NotInstalled {
                    program: self.program.clone(),
                }
            } else {
                ProcessError::Spawn {
                    program: self.program.clone(),
                    source,
                }
            }
        })?;
        // `id()` is gone once the child is reaped, the group may outlive it
        let group = child.id().map(|pid| Pid::from_raw(pid as i32));
        log::debug!("Spawned `{}` with pid {:?}", self.program, group);

        let stdin_writer = child.stdin.take().map(|mut pipe| {
            let input = self.stdin.clone();
            tokio::spawn(async move {
                if input.is_empty() {
                    return;
                }
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    // The child may exit without consuming its input
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        log::debug!("Failed to write stdin: {e}");
                    }
                }
                // Dropping the pipe closes it so the child sees EOF
            })
        });

        let (stdout_pipe, stderr_pipe) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                kill_process_group(group, &mut child);
                return Err(self.io_error(std::io::Error::other("output pipes were not captured")));
            }
        };

        let finished = {
            let collect = async {
                let (stdout, stderr) = tokio::try_join!(
                    self.read_capped(stdout_pipe),
                    self.read_capped(stderr_pipe),
                )?;
                let status = child.wait().await.map_err(|e| self.io_error(e))?;
                Ok::<_, ProcessError>((stdout, stderr, status))
            };

            tokio::select! {
                result = tokio::time::timeout(self.timeout, collect) => match result {
                    Ok(done) => done,
                    Err(_) => Err(ProcessError::TimedOut {
                        program: self.program.clone(),
                        limit: self.timeout,
                    }),
                },
                _ = cancel.cancelled() => Err(ProcessError::Cancelled {
                    program: self.program.clone(),
                }),
            }
        };

        let (stdout, stderr, status) = match finished {
            Ok(done) => done,
            Err(e) => {
                log::warn!("Killing `{}`: {e}", self.program);
                if let Some(writer) = stdin_writer {
                    writer.abort();
                }
                kill_process_group(group, &mut child);
                if let Err(wait_err) = child.wait().await {
                    log::warn!("Failed to reap `{}`: {wait_err}", self.program);
                }
                return Err(e);
            }
        };

        // Background processes the program left behind die with it
        kill_group(group);

        let output = ProcessOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            status,
            elapsed: started.elapsed(),
        };
        log::debug!(
            "`{}` finished with {} in {}ms",
            self.program,
            output.status,
            output.elapsed.as_millis()
        );
        Ok(output)
    }

    /// Reads a pipe to EOF, failing as soon as it yields more than the limit
    async fn read_capped<R: AsyncRead + Unpin>(&self, pipe: R) -> Result<Vec<u8>, ProcessError> {
        let mut buf = Vec::new();
        pipe.take(self.output_limit.saturating_add(1))
            .read_to_end(&mut buf)
            .await
            .map_err(|e| self.io_error(e))?;
        if buf.len() as u64 > self.output_limit {
            return Err(ProcessError::OutputLimitExceeded {
                program: self.program.clone(),
                limit: self.output_limit,
            });
        }
        Ok(buf)
    }

    fn io_error(&self, source: std::io::Error) -> ProcessError {
        ProcessError::Io {
            program: self.program.clone(),
            source,
        }
    }
}

/// Sends SIGKILL to the group the child leads through `process_group(0)`
fn kill_group(group: Option<Pid>) {
    let Some(group) = group else { return };
    match killpg(group, Signal::SIGKILL) {
        Ok(()) => log::debug!("Killed leftover processes in group {group}"),
        // Nothing left in the group
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => log::debug!("killpg({group}) failed: {e}"),
    }
}

/// Kills the child together with anything it forked
fn kill_process_group(group: Option<Pid>, child: &mut Child) {
    kill_group(group);
    if let Err(e) = child.start_kill() {
        log::debug!("start_kill failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_stdin_is_forwarded_and_closed() {
        let output = Invocation::new("cat")
            .stdin("hello\nworld")
            .run(&CancellationToken::new())
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "hello\nworld");
        assert_eq!(output.stderr, "");
    }

    #[tokio::test]
    async fn test_empty_stdin_sends_eof() {
        let output = Invocation::new("cat")
            .timeout(Duration::from_secs(5))
            .run(&CancellationToken::new())
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "");
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let output = sh("echo partial; echo boom >&2; exit 3")
            .run(&CancellationToken::new())
            .await
            .unwrap();

        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stdout, "partial\n");
        assert_eq!(output.failure_message(), "boom");
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_stderr_falls_back_to_code() {
        let output = sh("exit 7").run(&CancellationToken::new()).await.unwrap();
        assert_eq!(output.failure_message(), "Process exited with code 7");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let started = Instant::now();
        let err = sh("sleep 30")
            .timeout(Duration::from_millis(300))
            .run(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::TimedOut { .. }));
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_kills_forked_children() {
        // The background sleep keeps the pipes open unless the whole group dies
        let started = Instant::now();
        let err = sh("sleep 30 & sleep 30")
            .timeout(Duration::from_millis(300))
            .run(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_output_over_limit_kills_process() {
        let started = Instant::now();
        let err = sh("while :; do echo yyyyyyyyyyyyyyyy; done")
            .output_limit(4096)
            .timeout(Duration::from_secs(10))
            .run(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::OutputLimitExceeded { limit: 4096, .. }));
        assert_eq!(err.to_string(), "Output limit of 4096 bytes exceeded");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stderr_is_capped_too() {
        let err = sh("head -c 10000 /dev/zero >&2")
            .output_limit(100)
            .run(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::OutputLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_output_at_limit_is_kept() {
        let output = sh("printf abcd")
            .output_limit(4)
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output.stdout, "abcd");
    }

    #[tokio::test]
    async fn test_clean_exit_kills_background_children() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("background.pid");
        let script = format!(
            "sleep 4242 >/dev/null 2>&1 </dev/null &\necho $! > {}\necho started",
            pid_file.display()
        );

        let output = sh(&script).run(&CancellationToken::new()).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "started\n");

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        // The killed sleep is reparented and reaped by init, give it a moment
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut alive = true;
        while alive && Instant::now() < deadline {
            alive = nix::sys::signal::kill(Pid::from_raw(pid), None::<Signal>).is_ok()
                && !is_zombie(pid);
            if alive {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
        assert!(!alive, "background process {pid} survived the run");
    }

    fn is_zombie(pid: i32) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .map(|stat| {
                stat.rsplit_once(')')
                    .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z'))
            })
            .unwrap_or(true)
    }

    #[tokio::test]
    async fn test_missing_program_names_the_tool() {
        let err = Invocation::new("definitely-not-a-real-interpreter")
            .run(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::NotInstalled { .. }));
        assert!(err.to_string().contains("definitely-not-a-real-interpreter"));
        assert!(err.to_string().contains("install"));
    }

    #[tokio::test]
    async fn test_cancellation_kills_process() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let err = sh("sleep 30").run(&cancel).await.unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_runs_in_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "found").unwrap();

        let output = Invocation::new("cat")
            .arg("marker.txt")
            .current_dir(dir.path())
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output.stdout, "found");
    }
}
