//! Error types for probing and merging.
//!
//! Every failure that comes from an external tool carries the tool's captured
//! stderr so the message shown to the user says what ffmpeg actually said.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Keep only the tail of long ffmpeg logs
const DIAGNOSTIC_TAIL_LINES: usize = 40;

/// A tool that ran and exited unsuccessfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    pub tool: String,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl ToolFailure {
    /// Last lines of stderr, or a status description when stderr was empty
    pub fn diagnostic(&self) -> String {
        let lines: Vec<&str> = self
            .stderr
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .collect();

        if lines.is_empty() {
            return match self.exit_code {
                Some(code) => format!("{} exited with status {}", self.tool, code),
                None => format!("{} was terminated by a signal", self.tool),
            };
        }

        let start = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
        lines[start..].join("\n")
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "{} failed (exit {}): {}", self.tool, code, self.diagnostic()),
            None => write!(f, "{} failed: {}", self.tool, self.diagnostic()),
        }
    }
}

/// Running a single external command
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Failed(ToolFailure),

    #[error("cancelled")]
    Cancelled,
}

impl RunError {
    /// Text to surface to the user for this failure
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Failed(failure) => failure.diagnostic(),
            other => other.to_string(),
        }
    }
}

/// Probing one input file
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run ffprobe for {}: {source}", .path.display())]
    Run {
        path: PathBuf,
        #[source]
        source: RunError,
    },

    #[error("failed to parse ffprobe data for {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no video stream with valid dimensions in {}", .path.display())]
    NoVideoStream { path: PathBuf },
}

/// Merging a request.
///
/// `Cancelled` is used between the internal stages only: `MergeService::merge`
/// reports cancellation as `MergeOutcome::Cancelled`.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("at least two videos are required to merge (got {0})")]
    TooFewInputs(usize),

    #[error("{0}")]
    ToolMissing(String),

    #[error("a merge is already running")]
    AlreadyRunning,

    #[error("output {} is also one of the inputs", .0.display())]
    OutputIsInput(PathBuf),

    #[error("failed to normalize {} (input {index}): {diagnostic}", .path.display())]
    Normalization {
        index: usize,
        path: PathBuf,
        diagnostic: String,
    },

    #[error("concat failed: {diagnostic}")]
    Concat { diagnostic: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("merge cancelled")]
    Cancelled,
}

impl MergeError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
