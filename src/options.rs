//! Standard command-line flags shared by every script.
//!
//! [`StandardOptions`] wraps an author's [`clap::Args`] schema with
//! `--version` and a repeatable `--verbose`/`-v` counter. The author's own
//! flags are flattened in untouched; the two ids below are reserved.

use crate::error::OptionsError;
use crate::io::Io;
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, Args, ColorChoice, Command, FromArgMatches};
use std::ffi::OsString;
use std::marker::PhantomData;
use std::ops::Deref;

const VERSION_ID: &str = "version";
const VERBOSE_ID: &str = "verbose";

/// Parsed options: the author's schema value plus the verbosity counter.
#[derive(Debug, Clone)]
pub struct Options<T> {
    verbosity: u8,
    inner: T,
}

impl<T> Options<T> {
    pub fn new(verbosity: u8, inner: T) -> Self {
        Self { verbosity, inner }
    }

    /// Number of `-v`/`--verbose` occurrences, saturating at `u8::MAX`.
    ///
    /// clap's counter stops at 255; anything past 2 already means `trace`.
    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> Deref for Options<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

/// Option parser for schema `T` augmented with the standard flags.
pub struct StandardOptions<T> {
    command: Command,
    version: &'static str,
    verbosity: u8,
    io: Io,
    _schema: PhantomData<fn() -> T>,
}

impl<T: Args + FromArgMatches> StandardOptions<T> {
    /// Parser writing to the real process streams.
    pub fn new(name: &'static str, version: &'static str) -> Self {
        Self::with_io(name, version, Io::std())
    }

    pub fn with_io(name: &'static str, version: &'static str, io: Io) -> Self {
        let base = Command::new(name)
            .version(version)
            .no_binary_name(true)
            .color(ColorChoice::Never)
            .disable_version_flag(true)
            .arg(
                Arg::new(VERSION_ID)
                    .long("version")
                    .help("Print the program's version and exit")
                    .action(ArgAction::Version),
            )
            .arg(
                Arg::new(VERBOSE_ID)
                    .short('v')
                    .long("verbose")
                    .help("Turn on verbose logging (repeat for more)")
                    .action(ArgAction::Count),
            );

        Self {
            command: T::augment_args(base),
            version,
            verbosity: 0,
            io,
            _schema: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.command.get_name()
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Verbosity seen by the last parse (capped at `u8::MAX`); 0 before any parse.
    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    pub fn io_mut(&mut self) -> &mut Io {
        &mut self.io
    }

    /// Rendered usage text for the augmented schema.
    pub fn usage(&mut self) -> String {
        self.command.render_help().to_string()
    }

    /// Parse arguments, excluding the program name.
    ///
    /// `--version` and `--help` write to the injected stdout and come back as
    /// [`OptionsError::Exit`]; anything the parser rejects comes back as
    /// [`OptionsError::Usage`] without printing.
    pub fn parse_from<I, A>(&mut self, args: I) -> Result<Options<T>, OptionsError>
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString> + Clone,
    {
        self.verbosity = 0;
        let matches = match self.command.try_get_matches_from_mut(args) {
            Ok(m) => m,
            Err(e) => return Err(self.handle_clap_error(e)),
        };

        self.verbosity = matches.get_count(VERBOSE_ID);
        let inner = match T::from_arg_matches(&matches) {
            Ok(inner) => inner,
            Err(e) => return Err(self.handle_clap_error(e)),
        };
        Ok(Options::new(self.verbosity, inner))
    }

    fn handle_clap_error(&mut self, err: clap::Error) -> OptionsError {
        match err.kind() {
            ErrorKind::DisplayVersion => {
                let _ = writeln!(self.io.stdout(), "{}", self.version);
                let _ = self.io.stdout().flush();
                OptionsError::Exit { code: 0 }
            }
            ErrorKind::DisplayHelp => {
                let _ = write!(self.io.stdout(), "{}", err.render());
                let _ = self.io.stdout().flush();
                OptionsError::Exit { code: 0 }
            }
            _ => OptionsError::Usage {
                message: usage_message(&err),
                usage: self.usage(),
            },
        }
    }
}

/// First line of a rendered clap error without its `error: ` prefix.
fn usage_message(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    let first = rendered.lines().next().unwrap_or_default();
    first.strip_prefix("error: ").unwrap_or(first).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Args)]
    struct Schema {
        /// Target node
        #[arg(long)]
        node: Option<String>,
    }

    #[derive(Debug, Args)]
    struct Required {
        #[arg(long)]
        deployment: String,
    }

    fn parser<T: Args + FromArgMatches>() -> (StandardOptions<T>, crate::io::CapturedOutput) {
        let (io, captured) = Io::captured();
        (StandardOptions::with_io("flocker-test", "1.2.3", io), captured)
    }

    #[test]
    fn verbosity_starts_at_zero() {
        let (opts, _) = parser::<Schema>();
        assert_eq!(opts.verbosity(), 0);

        let (mut opts, _) = parser::<Schema>();
        let parsed = opts.parse_from(Vec::<String>::new()).unwrap();
        assert_eq!(parsed.verbosity(), 0);
    }

    #[test]
    fn verbose_flag_counts_occurrences() {
        let (mut opts, _) = parser::<Schema>();
        let parsed = opts.parse_from(["-v", "-v"]).unwrap();
        assert_eq!(parsed.verbosity(), 2);
        assert_eq!(opts.verbosity(), 2);

        let parsed = opts.parse_from(["-vvv", "--verbose"]).unwrap();
        assert_eq!(parsed.verbosity(), 4);
    }

    #[test]
    fn verbose_count_saturates_at_u8_max() {
        let (mut opts, _) = parser::<Schema>();
        let parsed = opts.parse_from(vec!["-v"; 300]).unwrap();
        assert_eq!(parsed.verbosity(), u8::MAX);
    }

    #[test]
    fn author_flags_survive_augmentation() {
        let (mut opts, _) = parser::<Schema>();
        let parsed = opts.parse_from(["--node", "10.0.0.1", "-v"]).unwrap();
        assert_eq!(parsed.node.as_deref(), Some("10.0.0.1"));
        assert_eq!(parsed.verbosity(), 1);
    }

    #[test]
    fn version_writes_version_line_and_exits_zero() {
        let (mut opts, captured) = parser::<Required>();
        let err = opts.parse_from(["--version"]).unwrap_err();
        assert!(matches!(err, OptionsError::Exit { code: 0 }));
        assert_eq!(captured.stdout(), "1.2.3\n");
        assert_eq!(captured.stderr(), "");
    }

    #[test]
    fn unknown_flag_is_usage_error() {
        let (mut opts, captured) = parser::<Schema>();
        let err = opts.parse_from(["--bogus"]).unwrap_err();
        match err {
            OptionsError::Usage { message, usage } => {
                assert!(message.contains("--bogus"), "message: {message}");
                assert!(usage.contains("--verbose"));
                assert!(usage.contains("--node"));
            }
            other => panic!("expected usage error, got {other:?}"),
        }
        // Nothing is printed by the parser itself.
        assert_eq!(captured.stdout(), "");
        assert_eq!(captured.stderr(), "");
    }

    #[test]
    fn missing_required_flag_is_usage_error() {
        let (mut opts, _) = parser::<Required>();
        let err = opts.parse_from(["-v"]).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn help_goes_to_stdout() {
        let (mut opts, captured) = parser::<Schema>();
        let err = opts.parse_from(["--help"]).unwrap_err();
        assert_eq!(err.exit_code(), 0);
        assert!(captured.stdout().contains("--version"));
    }
}
