//! Isolation & timeout supervisor.
//!
//! Each accepted script runs in a fresh worker process with an empty
//! environment. The supervisor writes the request, drains stdout and
//! stderr concurrently, and waits under a deadline. On expiry it kills the
//! process outright and reaps it; the script is never asked to stop.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sift_core::Violation;
use sift_eval::ScriptOutput;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

use crate::channel::{WorkerRequest, WorkerResponse};
use crate::error::SandboxError;

/// Most stderr kept for a failure message.
const STDERR_TAIL: usize = 2048;

/// How to start a worker: a program plus fixed leading arguments
/// (`sift-worker`, or `sift worker`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        WorkerCommand {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `sift-worker` beside the running executable if present, else the
    /// running executable's own `worker` subcommand.
    pub fn discover() -> Result<Self, SandboxError> {
        let exe = std::env::current_exe().map_err(|source| SandboxError::Spawn {
            program: PathBuf::from("sift-worker"),
            source,
        })?;
        let sibling = exe.with_file_name(format!("sift-worker{}", std::env::consts::EXE_SUFFIX));
        if sibling.is_file() {
            return Ok(WorkerCommand::new(sibling));
        }
        Ok(WorkerCommand::new(exe).arg("worker"))
    }
}

/// Terminal state of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed {
        output: ScriptOutput,
    },
    /// The validator declined; no process was started.
    Rejected {
        violation: Violation,
    },
    Failed {
        message: String,
        #[serde(default)]
        console: Vec<String>,
    },
    /// The worker was killed and reaped at the deadline. `pid` is the
    /// process that was terminated, when the platform reported one.
    TimedOut {
        after_ms: u64,
        #[serde(default)]
        pid: Option<u32>,
    },
}

impl RunOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        RunOutcome::Failed {
            message: message.into(),
            console: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Supervisor {
    command: WorkerCommand,
    deadline: Duration,
}

impl Supervisor {
    pub fn new(command: WorkerCommand, deadline: Duration) -> Self {
        Supervisor { command, deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run `request` in a fresh worker. Never returns an error: spawn and
    /// channel problems are [`RunOutcome::Failed`].
    pub async fn dispatch(&self, request: &WorkerRequest) -> RunOutcome {
        let payload = match serde_json::to_vec(request) {
            Ok(payload) => payload,
            Err(e) => return RunOutcome::failed(format!("could not encode request: {}", e)),
        };

        let mut command = Command::new(&self.command.program);
        command
            .args(&self.command.args)
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(program = %self.command.program.display(), error = %e, "worker spawn failed");
                return RunOutcome::failed(format!(
                    "could not start worker '{}': {}",
                    self.command.program.display(),
                    e
                ));
            }
        };
        let pid = child.id();
        tracing::info!(pid, deadline_ms = self.deadline.as_millis() as u64, "worker dispatched");

        // The stdin write runs alongside the deadline too: a worker that
        // never reads must not stall the supervisor.
        let stdin = child.stdin.take();
        let stdin_task = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        });
        let stdout = child.stdout.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut reader) = stdout {
                reader.read_to_end(&mut buf).await?;
            }
            Ok::<Vec<u8>, std::io::Error>(buf)
        });
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut reader) = stderr {
                reader.read_to_end(&mut buf).await?;
            }
            Ok::<Vec<u8>, std::io::Error>(buf)
        });

        let status = match timeout(self.deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return RunOutcome::failed(format!("waiting for worker: {}", e)),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::error!(error = %e, "could not kill timed-out worker");
                }
                stdin_task.abort();
                stdout_task.abort();
                stderr_task.abort();
                let after_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(after_ms, pid, "worker timed out and was killed");
                return RunOutcome::TimedOut { after_ms, pid };
            }
        };

        if let Ok(Err(e)) = stdin_task.await {
            tracing::debug!(error = %e, "worker closed stdin early");
        }
        let stdout = match stdout_task.await {
            Ok(Ok(buf)) => buf,
            Ok(Err(e)) => return RunOutcome::failed(format!("reading worker output: {}", e)),
            Err(e) => return RunOutcome::failed(format!("reading worker output: {}", e)),
        };
        let stderr = match stderr_task.await {
            Ok(Ok(buf)) => buf,
            _ => Vec::new(),
        };
        tracing::debug!(status = %status, elapsed_ms = started.elapsed().as_millis() as u64, "worker exited");

        match serde_json::from_slice::<WorkerResponse>(&stdout) {
            Ok(WorkerResponse::Completed { output }) => RunOutcome::Completed { output },
            Ok(WorkerResponse::Rejected { violation }) => RunOutcome::Rejected { violation },
            Ok(WorkerResponse::Failed {
                message, console, ..
            }) => RunOutcome::Failed { message, console },
            Err(e) => RunOutcome::failed(format!(
                "worker exited with {} without a readable response ({}){}",
                status,
                e,
                tail(&stderr)
            )),
        }
    }
}

/// Last part of the worker's stderr, prefixed for appending to a message.
fn tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map(|(i, _)| i)
        .unwrap_or(0);
    format!(": {}", &text[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_tail_keeps_the_end() {
        assert_eq!(tail(b""), "");
        assert_eq!(tail(b"  panicked  \n"), ": panicked");
        let long = "x".repeat(STDERR_TAIL * 2) + "END";
        let got = tail(long.as_bytes());
        assert!(got.ends_with("END"));
        assert!(got.len() <= STDERR_TAIL + 3);
    }

    #[tokio::test]
    async fn missing_program_is_a_failure() {
        let supervisor = Supervisor::new(
            WorkerCommand::new("/nonexistent/sift-worker"),
            Duration::from_secs(1),
        );
        let request = WorkerRequest {
            script: "return 1;".into(),
            store: PathBuf::from("/nonexistent/sift.db"),
            policy: sift_core::Policy::default(),
            max_result_rows: 1,
        };
        let outcome = supervisor.dispatch(&request).await;
        let RunOutcome::Failed { message, .. } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(message.contains("could not start worker"), "{message}");
    }
}
