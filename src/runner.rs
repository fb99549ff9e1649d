//! Top-level script orchestration.
//!
//! ```text
//! Idle ─► Parsing ─┬─► usage error: usage + "ERROR: ..." on stderr, exit 1
//!                  ├─► --version / --help: printed, exit 0
//!                  └─► Running (log session attached)
//!                        └─► react(main) ─► Done (session detached), exit code
//! ```
//!
//! Logging setup is best-effort: if the directory or file cannot be created
//! the script still runs, just without a log file.

use crate::error::OptionsError;
use crate::logging::{program_basename, LogSession};
use crate::options::{Options, StandardOptions};
use crate::reactor::{EventLoop, LoopConfig, LoopHandle};
use async_trait::async_trait;
use clap::{Args, FromArgMatches};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location for per-run log files.
pub const DEFAULT_LOG_DIRECTORY: &str = "/var/log/flocker";

/// A program that can be driven by [`ScriptRunner`].
#[async_trait(?Send)]
pub trait Script {
    /// The author's option schema; the standard flags are added on top.
    type Options: Args + FromArgMatches;

    /// Entry point, run on the single-threaded event loop.
    async fn main(&self, handle: LoopHandle, options: &Options<Self::Options>) -> anyhow::Result<()>;

    /// Shutdown grace period for this run; overrides [`RunnerConfig`] when set.
    fn shutdown_grace(&self, _options: &Options<Self::Options>) -> Option<Duration> {
        None
    }
}

/// Runner settings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub log_directory: PathBuf,
    pub loop_config: LoopConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
            loop_config: LoopConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn with_log_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_directory = dir.into();
        self
    }

    pub fn with_loop_config(mut self, loop_config: LoopConfig) -> Self {
        self.loop_config = loop_config;
        self
    }
}

/// Parses arguments, opens the log session and runs a [`Script`].
pub struct ScriptRunner<S: Script> {
    script: S,
    options: StandardOptions<S::Options>,
    config: RunnerConfig,
}

impl<S: Script> ScriptRunner<S> {
    pub fn new(script: S, options: StandardOptions<S::Options>) -> Self {
        Self {
            script,
            options,
            config: RunnerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn log_directory(&self) -> &Path {
        &self.config.log_directory
    }

    /// Run with the process's own argument vector.
    pub fn main(self) -> i32 {
        self.run(std::env::args_os().collect())
    }

    /// Run with `argv` (program name first) and return the exit code.
    pub fn run(mut self, argv: Vec<OsString>) -> i32 {
        let options = match self.options.parse_from(argv.iter().skip(1).cloned()) {
            Ok(options) => options,
            Err(OptionsError::Usage { message, usage }) => {
                let stderr = self.options.io_mut().stderr();
                let _ = write!(stderr, "{usage}");
                let _ = writeln!(stderr, "ERROR: {message}");
                let _ = stderr.flush();
                return 1;
            }
            Err(other) => return other.exit_code(),
        };

        let program = match argv.first() {
            Some(argv0) => program_basename(argv0),
            None => self.options.name().to_string(),
        };

        // Intentionally silent: a missing or read-only log directory must not
        // stop an otherwise runnable script.
        let session = LogSession::open(
            &self.config.log_directory,
            &program,
            options.verbosity(),
            &argv,
        )
        .ok();

        let mut loop_config = self.config.loop_config.clone();
        if let Some(grace) = self.script.shutdown_grace(&options) {
            loop_config.shutdown_grace = Some(grace);
        }

        let code = match EventLoop::new(loop_config) {
            Ok(event_loop) => {
                let script = &self.script;
                let options = &options;
                event_loop.react(self.options.io_mut().stderr(), |handle| {
                    script.main(handle, options)
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to build event loop");
                let _ = writeln!(self.options.io_mut().stderr(), "ERROR: {e}");
                1
            }
        };

        tracing::debug!(code, "script finished");
        drop(session);
        code
    }
}
