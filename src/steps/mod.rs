//! # Step abstractions and the step registry.
//!
//! This module provides the step-related types:
//! - [`Direction`] - which queue a step belongs to (apply / revert)
//! - [`Step`] - one immutable unit of work (statement + params + optional continuation)
//! - [`Hook`] - async continuation / completion hook, with the closure-backed [`HookFn`]
//! - [`StepRegistry`] - two independent FIFO queues, one per direction

mod hook;
mod registry;
mod step;

pub use hook::{Hook, HookFn, HookRef};
pub use registry::StepRegistry;
pub use step::{Direction, Param, Step};
