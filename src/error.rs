//! Error types used by the migravisor engine and its collaborators.
//!
//! This module defines:
//!
//! - [`StatementError`] is reported by a [`Driver`](crate::Driver) when a statement fails.
//! - [`HookError`] is reported by a continuation, completion hook or host shutdown.
//! - [`EngineError`] is what a run resolves to when it cannot complete.
//!
//! [`EngineError`] provides helper methods (`as_label`, `as_message`) for logging/metrics.

use std::any::Any;

use thiserror::Error;

use crate::steps::Direction;

/// Failure reported by the data-access handle for one statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StatementError {
    /// Driver-supplied description of the failure.
    pub message: String,
}

impl StatementError {
    /// Creates a statement error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure reported by user-supplied asynchronous code (continuations, completion hooks, hosts).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HookError {
    /// Hook-supplied description of the failure.
    pub message: String,
}

impl HookError {
    /// Creates a hook error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// # Errors produced by an engine run.
///
/// Every variant is fatal for the run that produced it: the remaining steps are
/// not dispatched, the completion hook is skipped and the idle timer stays unarmed.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EngineError {
    /// A statement failed while error tolerance was off.
    #[error("{direction} step #{index} failed: {source}")]
    Statement {
        /// Direction being drained.
        direction: Direction,
        /// Zero-based position of the step within its queue.
        index: usize,
        /// Statement text that failed.
        statement: String,
        /// Driver error.
        #[source]
        source: StatementError,
    },

    /// A step continuation returned an error.
    #[error("{direction} step #{index} continuation failed: {source}")]
    Continuation {
        /// Direction being drained.
        direction: Direction,
        /// Zero-based position of the step within its queue.
        index: usize,
        /// Hook error.
        #[source]
        source: HookError,
    },

    /// The aggregate completion hook returned an error.
    #[error("{direction} completion hook failed: {source}")]
    Completion {
        /// Direction that finished draining.
        direction: Direction,
        /// Hook error.
        #[source]
        source: HookError,
    },

    /// User code (driver, continuation or completion hook) panicked during the run.
    #[error("{direction} run panicked: {reason}")]
    Panicked {
        /// Direction being drained.
        direction: Direction,
        /// Panic payload, rendered as text.
        reason: String,
    },

    /// The engine was used outside its single-run contract.
    #[error("engine misuse: {reason}")]
    Misuse {
        /// What went wrong.
        reason: &'static str,
    },
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use migravisor::EngineError;
    ///
    /// let err = EngineError::Misuse { reason: "ready signal dropped" };
    /// assert_eq!(err.as_label(), "engine_misuse");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::Statement { .. } => "step_statement_failed",
            EngineError::Continuation { .. } => "step_continuation_failed",
            EngineError::Completion { .. } => "completion_hook_failed",
            EngineError::Panicked { .. } => "run_panicked",
            EngineError::Misuse { .. } => "engine_misuse",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            EngineError::Statement {
                direction,
                index,
                statement,
                source,
            } => format!("{direction}[{index}] {statement:?}: {source}"),
            EngineError::Continuation {
                direction,
                index,
                source,
            } => format!("{direction}[{index}] continuation: {source}"),
            EngineError::Completion { direction, source } => {
                format!("{direction} completion: {source}")
            }
            EngineError::Panicked { direction, reason } => format!("{direction} panic: {reason}"),
            EngineError::Misuse { reason } => format!("misuse: {reason}"),
        }
    }

    /// Direction of the run that failed, if the error belongs to one.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            EngineError::Statement { direction, .. }
            | EngineError::Continuation { direction, .. }
            | EngineError::Completion { direction, .. }
            | EngineError::Panicked { direction, .. } => Some(*direction),
            EngineError::Misuse { .. } => None,
        }
    }
}

/// Renders a panic payload caught with `catch_unwind`.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
