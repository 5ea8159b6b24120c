//! Traits and types for running external tools

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A fully specified external process launch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Binary to execute
    pub program: PathBuf,
    /// Arguments, passed verbatim (no shell)
    pub args: Vec<OsString>,
    /// Working directory, inherited when `None`
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    /// Start an invocation of `program`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append an option and its value
    pub fn opt(self, flag: &str, value: impl Into<OsString>) -> Self {
        self.arg(flag).arg(value)
    }

    /// Set the working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// File name of the program, for logs
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Value following `flag`, if present
    pub fn value_of(&self, flag: &str) -> Option<&std::ffi::OsStr> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|v| v.as_os_str())
    }

    /// Last argument, which is the positional target for all three tools
    pub fn last_arg(&self) -> Option<&Path> {
        self.args.last().map(Path::new)
    }
}

/// How an external process ended
///
/// A timeout is a normal outcome, not an error: the stage decides what it
/// means. Errors are reserved for failing to launch the process at all.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process exited on its own
    Exited {
        /// Exit code (`None` if killed by a signal)
        code: Option<i32>,
        /// Captured standard output (lossy UTF-8)
        stdout: String,
        /// Captured standard error (lossy UTF-8)
        stderr: String,
    },
    /// The wall-clock limit elapsed and the process was killed
    TimedOut {
        /// The limit that elapsed
        after: Duration,
    },
}

impl ProcessOutcome {
    /// Exited with status zero
    pub fn succeeded(&self) -> bool {
        matches!(self, ProcessOutcome::Exited { code: Some(0), .. })
    }

    /// Exit code, if the process exited normally
    pub fn code(&self) -> Option<i32> {
        match self {
            ProcessOutcome::Exited { code, .. } => *code,
            ProcessOutcome::TimedOut { .. } => None,
        }
    }

    /// Captured standard error (empty on timeout)
    pub fn stderr(&self) -> &str {
        match self {
            ProcessOutcome::Exited { stderr, .. } => stderr,
            ProcessOutcome::TimedOut { .. } => "",
        }
    }

    /// Standard output followed by standard error
    pub fn combined_output(&self) -> String {
        match self {
            ProcessOutcome::Exited { stdout, stderr, .. } => format!("{stdout}{stderr}"),
            ProcessOutcome::TimedOut { .. } => String::new(),
        }
    }
}

/// Runs external processes to completion or timeout
///
/// The pipeline launches one process at a time and blocks on it. Tests
/// substitute an implementation that records invocations and fabricates
/// the files a real tool would leave behind.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `invocation`, killing it if it outlives `timeout`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ExternalTool`] if the process cannot be
    /// spawned or its output cannot be collected. Non-zero exits and
    /// timeouts are reported through [`ProcessOutcome`].
    async fn run(&self, invocation: &Invocation, timeout: Duration)
    -> crate::Result<ProcessOutcome>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
