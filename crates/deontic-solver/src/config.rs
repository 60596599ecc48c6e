//! Solver invocation settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SOLVER: &str = "deolingo";

/// How the external solver is invoked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    /// Executable name or path.
    pub program: String,

    /// Arguments placed before the program file path.
    pub args: Vec<String>,

    /// Wall-clock limit per invocation (milliseconds, 0 = none).
    pub timeout_ms: u64,

    /// Exit codes that count as a completed solve. Clingo-family solvers
    /// exit 10 when satisfiable and 30 when all models were enumerated.
    pub success_exit_codes: Vec<i32>,

    /// Keep generated programs as `<dir>/req_<id>.lp` instead of
    /// temporary files.
    pub keep_programs_dir: Option<PathBuf>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_SOLVER.to_string(),
            args: Vec::new(),
            timeout_ms: 30_000,
            success_exit_codes: vec![0, 10, 30],
            keep_programs_dir: None,
        }
    }
}

impl SolverConfig {
    /// A solver run as `<program> <args...> <file.lp>`.
    pub fn custom(program: impl Into<String>, args: Vec<String>, timeout_ms: u64) -> Self {
        Self {
            program: program.into(),
            args,
            timeout_ms,
            ..Self::default()
        }
    }

    pub fn with_success_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.success_exit_codes = codes;
        self
    }

    pub fn with_keep_programs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.keep_programs_dir = Some(dir.into());
        self
    }

    pub fn is_success_code(&self, code: i32) -> bool {
        self.success_exit_codes.contains(&code)
    }
}
