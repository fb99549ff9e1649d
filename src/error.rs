//! Error types raised at the runtime's seams.
//!
//! - [`OptionsError`]: option parsing ended without producing options.
//! - [`ReactorError`]: the event loop could not finish its shutdown sequence.
//!
//! Script and service results use [`anyhow::Result`]; these enums only cover
//! failures owned by the runtime itself.

use std::time::Duration;
use thiserror::Error;

/// Outcome of option parsing that does not yield options.
#[derive(Error, Debug)]
pub enum OptionsError {
    /// An informational flag (`--version`, `--help`) already wrote its output;
    /// the process should exit with `code`.
    #[error("exit requested with status {code}")]
    Exit { code: i32 },

    /// Unknown flag, missing value or malformed value.
    #[error("{message}")]
    Usage {
        /// One-line description of what was wrong.
        message: String,
        /// Rendered usage text for the schema.
        usage: String,
    },
}

impl OptionsError {
    /// Process exit status this outcome maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            OptionsError::Exit { code } => *code,
            OptionsError::Usage { .. } => 1,
        }
    }
}

/// Errors produced by the event loop's shutdown sequence.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReactorError {
    /// Pre-shutdown hooks did not finish within the configured grace period.
    #[error("shutdown grace period {grace:?} exceeded; {pending} hook(s) still running")]
    GraceExceeded { grace: Duration, pending: usize },
}
