//! Injectable standard output streams.
//!
//! Everything the runtime prints goes through an [`Io`] value instead of the
//! process streams directly, so tests can capture output with [`Io::captured`].

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Output stream provider handed to option parsing and the runner.
pub struct Io {
    stdout: Box<dyn Write + Send>,
    stderr: Box<dyn Write + Send>,
}

impl Default for Io {
    fn default() -> Self {
        Self::std()
    }
}

impl std::fmt::Debug for Io {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Io").finish_non_exhaustive()
    }
}

impl Io {
    /// The process's real stdout/stderr.
    pub fn std() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    pub fn new(stdout: impl Write + Send + 'static, stderr: impl Write + Send + 'static) -> Self {
        Self {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        }
    }

    /// In-memory streams plus handles for reading back what was written.
    pub fn captured() -> (Self, CapturedOutput) {
        let out = SharedBuffer::default();
        let err = SharedBuffer::default();
        let captured = CapturedOutput {
            stdout: out.clone(),
            stderr: err.clone(),
        };
        (Self::new(out, err), captured)
    }

    pub fn stdout(&mut self) -> &mut dyn Write {
        &mut *self.stdout
    }

    pub fn stderr(&mut self) -> &mut dyn Write {
        &mut *self.stderr
    }
}

/// Read side of [`Io::captured`].
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    stdout: SharedBuffer,
    stderr: SharedBuffer,
}

impl CapturedOutput {
    pub fn stdout(&self) -> String {
        self.stdout.contents()
    }

    pub fn stderr(&self) -> String {
        self.stderr.contents()
    }
}

/// Cloneable `Write` target backed by a shared byte vector.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_streams_are_separate() {
        let (mut io, captured) = Io::captured();
        write!(io.stdout(), "out").unwrap();
        write!(io.stderr(), "err").unwrap();
        assert_eq!(captured.stdout(), "out");
        assert_eq!(captured.stderr(), "err");
    }
}
