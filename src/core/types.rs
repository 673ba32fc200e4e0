//! SZ-001: Shared types — unit lifecycle, error taxonomy, exit codes.

use super::parser::ParseError;
use std::fmt;

// ============================================================================
// Exit codes
// ============================================================================

/// Batch finished and every file passed.
pub const EXIT_SUCCESS: i32 = 0;

/// Batch failed or was interrupted.
pub const EXIT_FAILURE: i32 = 2;

/// Worker ran its stanza and something in it failed.
pub const WORKER_FAILED: i32 = 1;

/// Worker stopped because it saw an interrupt.
pub const WORKER_INTERRUPTED: i32 = 130;

// ============================================================================
// Unit lifecycle
// ============================================================================

/// Lifecycle state of a unit.
///
/// `Created → Configuring → Executing → Succeeded | Failed`. A unit can jump
/// straight to `Failed` from `Configuring` when an option is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UnitState {
    Created,
    Configuring,
    Executing,
    Succeeded,
    Failed,
}

// ============================================================================
// Errors
// ============================================================================

/// Everything that can go wrong at a unit boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    /// Malformed script line; fatal to the enclosing file.
    Parse(ParseError),
    /// A directive's `set_option`, `execute` or `cleanup` returned an error or panicked.
    Execution { unit: String, message: String },
    /// A worker process exited nonzero (or was killed).
    WorkerExit {
        directive: String,
        pid: u32,
        code: Option<i32>,
    },
    /// User interrupt; fatal to the whole batch.
    Interrupted,
}

impl UnitError {
    /// Short class name used as the headline of logged traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "ParseError",
            Self::Execution { .. } => "ExecutionError",
            Self::WorkerExit { .. } => "WorkerExitError",
            Self::Interrupted => "InterruptError",
        }
    }
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{}", e),
            Self::Execution { unit, message } => write!(f, "{}: {}", unit, message),
            Self::WorkerExit {
                directive,
                pid,
                code: Some(code),
            } => write!(f, "worker {} for '{}' exited with status {}", pid, directive, code),
            Self::WorkerExit {
                directive,
                pid,
                code: None,
            } => write!(f, "worker {} for '{}' was terminated by a signal", pid, directive),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for UnitError {}

impl From<ParseError> for UnitError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}
