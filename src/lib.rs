//! Runtime for flocker command-line scripts.
//!
//! A script implements [`Script`] and is handed to a [`ScriptRunner`], which
//! parses its options (with the standard `--version` / `--verbose` flags from
//! [`StandardOptions`]), opens a per-run log file, and drives the script's
//! `main` on a single-threaded [`EventLoop`]. Long-running scripts use
//! [`bind`] to start a [`Service`] and stop it when the loop shuts down.

pub mod error;
pub mod io;
pub mod logging;
pub mod model;
pub mod options;
pub mod reactor;
pub mod runner;
pub mod service;
mod signals;

pub use error::{OptionsError, ReactorError};
pub use io::{CapturedOutput, Io};
pub use logging::LogSession;
pub use options::{Options, StandardOptions};
pub use reactor::{EventLoop, LoopConfig, LoopHandle};
pub use runner::{RunnerConfig, Script, ScriptRunner, DEFAULT_LOG_DIRECTORY};
pub use service::{bind, Service, ShutdownFuture};
