//! # Readiness dependency.
//!
//! A [`Host`] is whatever had to finish booting before the engine may start draining
//! (an application container, a config loader). It is handed over with the ready
//! signal. When present, the engine owns its teardown: once a run finishes and the
//! engine stays idle, the host is shut down and the exit action runs.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HookError;

/// Shared handle to a host.
pub type HostRef = Arc<dyn Host>;

/// # Booted dependency owned by the engine after readiness.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// Human-readable name (for logs).
    fn name(&self) -> &str {
        "host"
    }

    /// Tears the host down before the process exits.
    ///
    /// Failures are logged and otherwise ignored; exit proceeds regardless.
    async fn shutdown(&self) -> Result<(), HookError>;
}
