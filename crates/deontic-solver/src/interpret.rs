//! Solver output interpretation.

use std::sync::OnceLock;

use dpacheck_core::SolverStatus;
use regex::Regex;

use crate::runner::SolverRun;

fn status_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bstatus\((satisfied|violated|not_mentioned)\)").expect("static regex")
    })
}

/// Map solver stdout to a status.
///
/// `UNSATISFIABLE` wins over everything; a single `status(violated)` in any
/// model makes the requirement violated; otherwise `status(satisfied)` means
/// satisfied. Anything else is undetermined.
pub fn parse_status(stdout: &str) -> SolverStatus {
    if stdout
        .lines()
        .any(|line| line.trim().eq_ignore_ascii_case("UNSATISFIABLE"))
    {
        return SolverStatus::Undetermined;
    }

    let mut satisfied = false;
    for caps in status_regex().captures_iter(stdout) {
        match &caps[1] {
            "violated" => return SolverStatus::Violated,
            "satisfied" => satisfied = true,
            _ => {}
        }
    }
    if satisfied {
        SolverStatus::Satisfied
    } else {
        SolverStatus::Undetermined
    }
}

/// Interpret a finished solver process. Returns the status and the reason
/// when the run could not be trusted.
pub fn interpret(run: &SolverRun, success_exit_codes: &[i32]) -> (SolverStatus, Option<String>) {
    match run.exit_code {
        Some(code) if success_exit_codes.contains(&code) => {}
        Some(code) => {
            return (
                SolverStatus::Undetermined,
                Some(format!("solver exited with code {code}")),
            )
        }
        None => {
            return (
                SolverStatus::Undetermined,
                Some("solver terminated by signal".to_string()),
            )
        }
    }
    if run.stdout.trim().is_empty() {
        return (
            SolverStatus::Undetermined,
            Some("solver produced no output".to_string()),
        );
    }
    (parse_status(&run.stdout), None)
}
