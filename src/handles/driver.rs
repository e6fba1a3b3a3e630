//! # Data-access handle.
//!
//! A [`Driver`] executes one statement per call. The engine borrows a [`DriverRef`]
//! for the length of a single run and drops it afterwards; it never opens, pools or
//! closes connections.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StatementError;
use crate::steps::Param;

/// Shared handle to a driver.
pub type DriverRef = Arc<dyn Driver>;

/// # Single-statement executor.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use migravisor::{Driver, Param, StatementError};
///
/// struct Noop;
///
/// #[async_trait]
/// impl Driver for Noop {
///     async fn execute(&self, _statement: &str, _params: &[Param]) -> Result<(), StatementError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Executes `statement` with `params` and reports success or failure exactly once.
    async fn execute(&self, statement: &str, params: &[Param]) -> Result<(), StatementError>;
}
