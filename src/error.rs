//! Error taxonomies for compilation, playback and persistence.
//!
//! Compile errors are fatal and carry the offending source line. Playback
//! errors abort the current run and carry the index and description of the
//! instruction that failed. Cancellation is never an error.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::evaluator::EvalError;
use crate::simulator::SimulatorError;

/// A structural problem found while compiling a script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("compile error (line {line}): {message}")]
pub struct CompileError {
    pub message: String,
    pub line: usize,
}

impl CompileError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

/// A failure that aborted a playback run.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("flow control error at instruction {index} ({instruction}): {source}")]
    FlowControl {
        index: usize,
        instruction: String,
        #[source]
        source: FlowControlError,
    },
    #[error("event execution error at instruction {index} ({instruction}): {source}")]
    EventExecution {
        index: usize,
        instruction: String,
        #[source]
        source: EventExecutionError,
    },
}

impl PlaybackError {
    /// Index of the instruction that failed.
    pub fn index(&self) -> usize {
        match self {
            Self::FlowControl { index, .. } | Self::EventExecution { index, .. } => *index,
        }
    }
}

/// Invalid control transfer: bad index, unknown label or unusable file.
#[derive(Debug, Error)]
pub enum FlowControlError {
    #[error("jump target {index} is out of range (sequence has {len} instructions)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("label '{0}' does not exist in this sequence")]
    UnresolvedLabel(String),
    #[error("no jump target configured")]
    MissingTarget,
    #[error("cannot jump to '{}': no file loader is available", .0.display())]
    NoFileLoader(PathBuf),
    #[error("cannot jump to '{}': {source}", .path.display())]
    ExternalFile {
        path: PathBuf,
        #[source]
        source: PersistError,
    },
}

/// An instruction's side effect failed.
#[derive(Debug, Error)]
pub enum EventExecutionError {
    #[error("script line {line}: {source}")]
    Script {
        line: usize,
        #[source]
        source: EvalError,
    },
    #[error("condition: {0}")]
    Condition(#[source] EvalError),
    #[error("output: {0}")]
    Output(#[from] SimulatorError),
    #[error("delay of {0} ms is too long to schedule")]
    DelayOutOfRange(f64),
}

/// Reading or writing a persisted sequence failed.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed sequence document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported sequence version {0}")]
    UnsupportedVersion(u32),
    #[error("instruction {index} has an invalid gap of {value} ms")]
    InvalidGap { index: usize, value: f64 },
    #[error("instruction {index} has an invalid delay of {value} ms")]
    InvalidDelay { index: usize, value: f64 },
    #[error(transparent)]
    Compile(#[from] CompileError),
}
