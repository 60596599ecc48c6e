//! Deontic solver adapter
//!
//! Renders a requirement's deontic rule together with the facts extracted
//! from a document into a logic program, runs an external solver
//! (`deolingo` by default) on it and maps the answer to a
//! [`dpacheck_core::SolverStatus`].

pub mod adapter;
pub mod config;
pub mod error;
pub mod interpret;
pub mod program;
pub mod runner;

pub use adapter::SolverAdapter;
pub use config::{SolverConfig, DEFAULT_SOLVER};
pub use error::{Result, SolverError};
pub use interpret::{interpret, parse_status};
pub use program::render_program;
pub use runner::{SolverRun, SolverRunner};
