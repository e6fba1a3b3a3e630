//! # Hook abstraction and function-backed hook implementation.
//!
//! A [`Hook`] is user code the sequencer awaits before it moves on. It is used in two places:
//! - as a **step continuation**: awaited after the step's statement, before the next step;
//! - as an **aggregate completion hook**: awaited once after a direction's queue drains.
//!
//! Resolving the returned future is the "proceed" signal. A hook that never resolves
//! holds the sequencer at that point forever; nothing else in the queue is dispatched.
//!
//! [`HookFn`] wraps a closure `F: Fn(DriverRef) -> Fut`, producing a fresh future per call.
//!
//! ## Example
//! ```rust
//! use migravisor::{DriverRef, HookFn, HookRef, HookError};
//!
//! let seed: HookRef = HookFn::arc(|db: DriverRef| async move {
//!     db.execute("INSERT INTO flags (name) VALUES ('seeded')", &[])
//!         .await
//!         .map_err(|e| HookError::new(e.message))
//! });
//! # let _ = seed;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HookError;
use crate::handles::DriverRef;

/// Shared handle to a hook.
pub type HookRef = Arc<dyn Hook>;

/// # Asynchronous continuation awaited by the sequencer.
///
/// Receives the data-access handle of the current run. Errors are always fatal for the run.
#[async_trait]
pub trait Hook: Send + Sync + 'static {
    /// Runs the hook to completion.
    async fn call(&self, db: DriverRef) -> Result<(), HookError>;
}

/// Function-backed hook implementation.
#[derive(Debug)]
pub struct HookFn<F> {
    f: F,
}

impl<F> HookFn<F> {
    /// Creates a new function-backed hook.
    ///
    /// Prefer [`HookFn::arc`] when you immediately need a [`HookRef`].
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the hook and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Hook for HookFn<F>
where
    F: Fn(DriverRef) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    async fn call(&self, db: DriverRef) -> Result<(), HookError> {
        (self.f)(db).await
    }
}
