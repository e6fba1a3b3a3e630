//! # Engine configuration.
//!
//! Provides [`Config`] centralized settings for an [`Engine`](crate::Engine).
//!
//! Config is used in two ways:
//! 1. **Engine creation**: `Engine::builder(config)`
//! 2. **Builder overrides**: `.verbose(..)` / `.ignore_errors(..)` / `.idle_timeout(..)`
//!
//! ## Sentinel values
//! - `idle_timeout = 0s` → the idle exit timer is never armed
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

/// Default quiescence interval before an idle engine terminates the process.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Global configuration for one engine instance.
///
/// ## Field semantics
/// - `verbose`: log each dispatched statement and the finishing phase
/// - `ignore_errors`: statement failures are logged and skipped instead of aborting the run
/// - `idle_timeout`: quiescent interval after a finished run before exit (`0s` = never)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct Config {
    /// Log dispatched statements and phase transitions through `tracing`.
    pub verbose: bool,

    /// Error-tolerance policy for statement failures.
    ///
    /// - `false` (default): a failing statement aborts the run and skips the completion hook
    /// - `true`: the failure is logged and the run continues with the next step
    pub ignore_errors: bool,

    /// Quiescent interval after a finished run before the exit action fires.
    ///
    /// Only armed when a host was supplied together with the ready signal.
    pub idle_timeout: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the idle timeout as an `Option`.
    ///
    /// - `None` → never arm the exit timer
    /// - `Some(d)` → exit after `d` of quiescence
    #[inline]
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout == Duration::ZERO {
            None
        } else {
            Some(self.idle_timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `verbose = false`
    /// - `ignore_errors = false` (statement failures are fatal)
    /// - `idle_timeout = 3s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            verbose: false,
            ignore_errors: false,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            bus_capacity: 1024,
        }
    }
}
