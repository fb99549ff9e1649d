//! Per-run log file sink.
//!
//! A [`LogSession`] is a scoped resource: [`LogSession::open`] creates the log
//! directory if needed, opens `<dir>/<program>-<pid>.log` for append, installs
//! a `tracing` subscriber writing to it as the thread's default and records the
//! argument vector. Dropping the session detaches the subscriber and closes
//! the file.
//!
//! The subscriber is thread-scoped (`set_default`), so it covers the
//! single-threaded event loop the runner drives on the same thread and does
//! not leak into other runners in the same process.
//!
//! `RUST_LOG` overrides the verbosity-derived level, but the argument record
//! is always kept: it goes to its own target, which stays at `info`.

use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Target of the argument record; enabled whatever `RUST_LOG` says.
const ARGUMENTS_TARGET: &str = "flocker_script::arguments";

/// An attached log sink. Detached on drop.
pub struct LogSession {
    path: PathBuf,
    file: Arc<File>,
    guard: Option<DefaultGuard>,
}

impl std::fmt::Debug for LogSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSession")
            .field("path", &self.path)
            .field("attached", &self.guard.is_some())
            .finish()
    }
}

impl LogSession {
    /// Create the log file and attach the sink.
    ///
    /// Fails only on I/O errors (directory creation, file open); the caller
    /// decides whether that is fatal.
    pub fn open(
        directory: &Path,
        program: &str,
        verbosity: u8,
        argv: &[OsString],
    ) -> io::Result<Self> {
        let rust_log = std::env::var("RUST_LOG").ok();
        let filter = build_env_filter(verbosity, rust_log.as_deref());
        Self::open_with_filter(directory, program, filter, argv)
    }

    fn open_with_filter(
        directory: &Path,
        program: &str,
        filter: EnvFilter,
        argv: &[OsString],
    ) -> io::Result<Self> {
        fs::create_dir_all(directory)?;
        let path = log_path(directory, program, std::process::id());
        let file = Arc::new(OpenOptions::new().create(true).append(true).open(&path)?);

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file.clone())
            .with_ansi(false)
            .with_target(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);

        tracing::info!(target: ARGUMENTS_TARGET, "Arguments: {:?}", argv);

        Ok(Self {
            path,
            file,
            guard: Some(guard),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LogSession {
    fn drop(&mut self) {
        // Detach first so nothing is written after the final sync.
        drop(self.guard.take());
        let _ = self.file.sync_data();
    }
}

/// `<directory>/<program>-<pid>.log`
pub fn log_path(directory: &Path, program: &str, pid: u32) -> PathBuf {
    directory.join(format!("{program}-{pid}.log"))
}

/// Base name of `argv[0]`, used to name the log file.
pub fn program_basename(argv0: &OsStr) -> String {
    Path::new(argv0)
        .file_name()
        .unwrap_or(argv0)
        .to_string_lossy()
        .into_owned()
}

/// `rust_log` (the `RUST_LOG` value) wins when it parses; otherwise the
/// level follows the verbosity counter.
fn build_env_filter(verbosity: u8, rust_log: Option<&str>) -> EnvFilter {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = rust_log
        .filter(|spec| !spec.trim().is_empty())
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new(level));
    match format!("{ARGUMENTS_TARGET}=info").parse::<Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}
