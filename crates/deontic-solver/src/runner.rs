//! Solver process execution.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use dpacheck_core::CancelToken;
use tokio::process::Command;

use crate::config::SolverConfig;
use crate::error::{Result, SolverError};

/// Captured output of one solver process.
#[derive(Debug, Clone)]
pub struct SolverRun {
    /// Exit code; `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,

    pub stdout: String,

    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl SolverRun {
    /// stdout followed by stderr, for diagnostics.
    pub fn raw_output(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Runs the configured solver against a program file.
pub struct SolverRunner;

impl SolverRunner {
    /// Execute `<program> <args...> <program_path>` and capture its output.
    ///
    /// The child is killed if the timeout elapses or `cancel` fires first.
    pub async fn execute(
        config: &SolverConfig,
        program_path: &Path,
        cancel: Option<&CancelToken>,
    ) -> Result<SolverRun> {
        let start = Instant::now();

        if config.program.trim().is_empty() {
            return Err(SolverError::EmptyCommand);
        }

        let child = Command::new(&config.program)
            .args(&config.args)
            .arg(program_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SolverError::Spawn {
                program: config.program.clone(),
                source,
            })?;

        let wait = async {
            if config.timeout_ms > 0 {
                tokio::time::timeout(
                    Duration::from_millis(config.timeout_ms),
                    child.wait_with_output(),
                )
                .await
                .map_err(|_| SolverError::Timeout {
                    timeout_ms: config.timeout_ms,
                })?
                .map_err(SolverError::from)
            } else {
                child.wait_with_output().await.map_err(SolverError::from)
            }
        };

        // dropping `wait` drops the child, which kills it
        let output = match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(SolverError::Cancelled),
                    out = wait => out?,
                }
            }
            None => wait.await?,
        };

        Ok(SolverRun {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
