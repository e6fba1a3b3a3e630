//! # Step descriptor.
//!
//! A [`Step`] bundles an opaque statement, its ordered bind parameters and an
//! optional continuation. Steps are immutable once built; the registry hands them
//! out by value, head first.

use std::fmt;
use std::sync::Arc;

use super::hook::HookRef;

/// Opaque bind value forwarded verbatim to the driver.
pub type Param = serde_json::Value;

/// Which queue a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Forward migration (`up`).
    Apply,
    /// Backward migration (`down`).
    Revert,
}

impl Direction {
    /// Stable lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Apply => "apply",
            Direction::Revert => "revert",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work in a direction queue.
///
/// ## Example
/// ```rust
/// use migravisor::{Step, Param};
///
/// let step = Step::new("INSERT INTO users (name) VALUES (?)", vec![Param::from("ada")]);
/// assert_eq!(step.statement(), "INSERT INTO users (name) VALUES (?)");
/// assert!(step.continuation().is_none());
/// ```
#[derive(Clone)]
pub struct Step {
    statement: Arc<str>,
    params: Arc<[Param]>,
    continuation: Option<HookRef>,
}

impl Step {
    /// Creates a step without a continuation.
    pub fn new(statement: impl Into<Arc<str>>, params: Vec<Param>) -> Self {
        Self {
            statement: statement.into(),
            params: params.into(),
            continuation: None,
        }
    }

    /// Returns a new step that awaits `continuation` before the next step is dispatched.
    pub fn with_continuation(mut self, continuation: HookRef) -> Self {
        self.continuation = Some(continuation);
        self
    }

    /// Statement text.
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Bind parameters, in order.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Continuation awaited after the statement, if any.
    pub fn continuation(&self) -> Option<&HookRef> {
        self.continuation.as_ref()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("statement", &self.statement)
            .field("params", &self.params)
            .field("continuation", &self.continuation.is_some())
            .finish()
    }
}
