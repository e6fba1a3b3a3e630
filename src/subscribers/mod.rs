//! # Event subscribers for the migravisor runtime.
//!
//! Subscribers observe the [`Event`](crate::Event)s the engine publishes while it
//! waits for readiness, drains queues and counts down to exit.
//!
//! ## Architecture
//! ```text
//!   Engine ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet
//!                                                              ┌──────┼──────┐
//!                                                              ▼      ▼      ▼
//!                                                          [queue] [queue] [queue]
//!                                                              │      │      │
//!                                                          on_event on_event on_event
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use migravisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct FailureCounter;
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::StepErrorIgnored {
//!             // increment a counter
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "failure-counter"
//!     }
//! }
//! ```

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
