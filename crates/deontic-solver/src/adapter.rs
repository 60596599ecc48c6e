//! The solver adapter: render, run, interpret.

use std::io::Write;
use std::path::{Path, PathBuf};

use dpacheck_core::{obs, CancelToken, ExtractedFact, Requirement, SolverResult, SolverStatus};
use tracing::{debug, warn};

use crate::config::SolverConfig;
use crate::error::{Result, SolverError};
use crate::interpret::interpret;
use crate::program::render_program;
use crate::runner::SolverRunner;

/// Evaluates one requirement at a time against an external deontic solver.
#[derive(Debug, Clone, Default)]
pub struct SolverAdapter {
    config: SolverConfig,
    cancel: Option<CancelToken>,
}

/// Where a rendered program lives while the solver reads it. Temporary
/// files are removed when this is dropped.
enum ProgramFile {
    Temp(tempfile::NamedTempFile),
    Kept(PathBuf),
}

impl ProgramFile {
    fn path(&self) -> &Path {
        match self {
            ProgramFile::Temp(file) => file.path(),
            ProgramFile::Kept(path) => path,
        }
    }
}

fn file_stem_for(requirement_id: &str) -> String {
    let safe: String = requirement_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("req_{safe}")
}

impl SolverAdapter {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Kill running solver processes when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn write_program(&self, requirement_id: &str, program: &str) -> Result<ProgramFile> {
        let stem = file_stem_for(requirement_id);
        match &self.config.keep_programs_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let path = dir.join(format!("{stem}.lp"));
                std::fs::write(&path, program)?;
                Ok(ProgramFile::Kept(path))
            }
            None => {
                let mut file = tempfile::Builder::new()
                    .prefix(&format!("{stem}_"))
                    .suffix(".lp")
                    .tempfile()?;
                file.write_all(program.as_bytes())?;
                file.flush()?;
                Ok(ProgramFile::Temp(file))
            }
        }
    }

    /// Solve one requirement. Never fails: every invocation problem is
    /// reported as [`SolverStatus::Undetermined`] with the diagnostic in
    /// `raw_solver_output`.
    pub async fn solve(&self, requirement: &Requirement, facts: Vec<ExtractedFact>) -> SolverResult {
        let program = render_program(requirement, &facts);
        debug!(requirement_id = %requirement.id, facts = facts.len(), "rendered solver program");

        let (status, raw, duration_ms) = match self.run(&requirement.id, &program).await {
            Ok((status, raw, duration_ms)) => (status, raw, duration_ms),
            Err(err) => {
                warn!(requirement_id = %requirement.id, error = %err, "solver invocation failed");
                (SolverStatus::Undetermined, err.to_string(), 0)
            }
        };

        let status_label = match status {
            SolverStatus::Satisfied => "satisfied",
            SolverStatus::Violated => "violated",
            SolverStatus::Undetermined => "undetermined",
        };
        obs::emit_solver_invoked(&requirement.id, status_label, duration_ms);

        SolverResult {
            requirement_id: requirement.id.clone(),
            status,
            supporting_facts: facts,
            raw_solver_output: raw,
        }
    }

    async fn run(&self, requirement_id: &str, program: &str) -> Result<(SolverStatus, String, u64)> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(SolverError::Cancelled);
        }
        let file = self.write_program(requirement_id, program)?;
        let run = SolverRunner::execute(&self.config, file.path(), self.cancel.as_ref()).await?;

        let (status, reason) = interpret(&run, &self.config.success_exit_codes);
        let mut raw = run.raw_output();
        if let Some(reason) = reason {
            warn!(requirement_id = %requirement_id, reason = %reason, "solver output not usable");
            raw = if raw.trim().is_empty() {
                reason
            } else {
                format!("{reason}\n{raw}")
            };
        }
        Ok((status, raw, run.duration_ms))
    }
}
