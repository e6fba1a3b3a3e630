//! # migravisor
//!
//! **Migravisor** sequences reversible units of work. A caller describes a migration
//! as two ordered lists of asynchronous steps (apply and revert), then runs either list
//! strictly in order against a data-access handle it supplies.
//!
//! ## Architecture
//! ```text
//!   EngineBuilder ──► apply/revert steps, completion hooks, policy
//!        │
//!        ▼ build()
//!   ┌──────────┐   up/down   ┌────────────────┐   Call    ┌─────────────────────────┐
//!   │  Engine  │ ──────────► │ ReadinessGate  │ ────────► │ RunLoop (single task)   │
//!   └──────────┘             │ (replay list)  │   FIFO    │  └─► Sequencer          │
//!        ▲                   └────────────────┘           │       ├─► Driver        │
//!        │                          ▲                     │       ├─► continuations │
//!   ReadySignal::ready(host) ───────┘                     │       └─► completion    │
//!                                                         └───────────┬─────────────┘
//!                                                                     ▼ run finished
//!                                                          IdleTimer::arm(idle_timeout)
//!                                                                     ▼ no activity
//!                                                          host.shutdown() + exit
//! ```
//!
//! ### Lifecycle
//! ```text
//! up(db) ─► [not ready? buffer] ─► RunStarted
//! loop {
//!   ├─► dequeue head step            (empty ─► finishing)
//!   ├─► driver.execute(...)          (error: fatal, or ignored by policy)
//!   └─► continuation.call(db)        (if declared; next step waits for it)
//! }
//! finishing ─► completion hook ─► RunFinished ─► idle timer armed (if a host is owned)
//! ```
//!
//! ## Features
//! | Area               | Description                                                   | Key types                              |
//! |--------------------|---------------------------------------------------------------|----------------------------------------|
//! | **Registration**   | Fluent step/hook registration before anything runs.           | [`EngineBuilder`], [`Step`], [`HookFn`] |
//! | **Execution**      | Strictly ordered apply/revert runs.                           | [`Engine`], [`Direction`], [`Phase`]   |
//! | **Readiness**      | Calls made before the host is up are replayed in order.       | [`ReadySignal`], [`ReadinessGate`]     |
//! | **Idle shutdown**  | Exit after a quiet interval, never while work may arrive.     | [`IdleTimer`], [`Host`]                |
//! | **Collaborators**  | Caller-supplied data access and host.                         | [`Driver`], [`Host`]                   |
//! | **Observability**  | Runtime events and subscribers.                               | [`Event`], [`Subscribe`]               |
//! | **Errors**         | Typed run and collaborator errors.                            | [`EngineError`], [`StatementError`]    |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use migravisor::{Config, Driver, DriverRef, Engine, Param, StatementError};
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl Driver for Printer {
//!     async fn execute(&self, sql: &str, params: &[Param]) -> Result<(), StatementError> {
//!         println!("{sql} {params:?}");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (engine, ready) = Engine::builder(Config::default())
//!         .apply("INSERT INTO t VALUES (?)", vec![Param::from("A")])
//!         .apply("INSERT INTO t VALUES (?)", vec![Param::from("B")])
//!         .revert("DELETE FROM t", vec![])
//!         .build();
//!
//!     // No host to wait for.
//!     ready.ready(None);
//!
//!     let db: DriverRef = Arc::new(Printer);
//!     engine.up(db).await?;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod handles;
mod steps;
mod subscribers;

// ---- Public re-exports ----

pub use config::{Config, DEFAULT_IDLE_TIMEOUT};
pub use crate::core::{
    Admission, Engine, EngineBuilder, ExitFn, IdleTimer, Phase, ReadinessGate, ReadySignal,
};
pub use error::{EngineError, HookError, StatementError};
pub use events::{Bus, Event, EventKind};
pub use handles::{Driver, DriverRef, Host, HostRef};
pub use steps::{Direction, Hook, HookFn, HookRef, Param, Step, StepRegistry};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
