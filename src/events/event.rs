//! # Runtime events emitted by the engine.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Readiness events**: deferred calls and the ready transition
//! - **Run events**: a direction run starting, each step, finishing or aborting
//! - **Idle events**: the exit timer being armed, cancelled or elapsing
//! - **Subscriber events**: fan-out overflow and panics
//!
//! The [`Event`] struct carries additional metadata such as timestamps, direction,
//! step position, statement text and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use migravisor::{Direction, Event, EventKind};
//!
//! let ev = Event::new(EventKind::StepDispatched)
//!     .with_direction(Direction::Apply)
//!     .with_step(0)
//!     .with_statement("INSERT A");
//!
//! assert_eq!(ev.kind, EventKind::StepDispatched);
//! assert_eq!(ev.statement.as_deref(), Some("INSERT A"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::steps::Direction;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Readiness events ===
    /// An `up`/`down` call arrived before readiness and was buffered.
    ///
    /// Sets:
    /// - `direction`: requested direction
    CallDeferred,

    /// The ready signal fired; buffered calls were replayed.
    ///
    /// Sets:
    /// - `replayed`: number of buffered calls replayed, in arrival order
    /// - `reason`: host name, if a host was supplied
    ReadySignaled,

    // === Run events ===
    /// A direction run started draining its queue.
    ///
    /// Sets:
    /// - `direction`
    RunStarted,

    /// A step's statement was handed to the driver.
    ///
    /// Sets:
    /// - `direction`, `step`, `statement`
    StepDispatched,

    /// The driver reported success for the step.
    ///
    /// Sets:
    /// - `direction`, `step`
    StepSucceeded,

    /// The driver reported a failure that error tolerance turned into a skip.
    ///
    /// Sets:
    /// - `direction`, `step`, `reason`
    StepErrorIgnored,

    /// The sequencer is waiting on a step continuation.
    ///
    /// Sets:
    /// - `direction`, `step`
    ContinuationAwaited,

    /// The queue drained and the completion phase finished.
    ///
    /// Sets:
    /// - `direction`
    RunFinished,

    /// The run stopped on a fatal error; no completion hook ran.
    ///
    /// Sets:
    /// - `direction`, `step` (if a step failed), `reason`
    RunAborted,

    // === Idle events ===
    /// The idle exit timer was armed.
    ///
    /// Sets:
    /// - `delay_ms`: quiescence interval
    IdleTimerArmed,

    /// A pending idle exit timer was cancelled by activity.
    IdleTimerCancelled,

    /// The idle exit timer elapsed; the host shuts down and the exit action runs.
    IdleTimeoutElapsed,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `reason`: subscriber name and panic info
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `reason`: subscriber name and reason
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Direction of the run, if applicable.
    pub direction: Option<Direction>,
    /// Zero-based step position within its queue.
    pub step: Option<u32>,
    /// Statement text of the step.
    pub statement: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Idle delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Number of buffered calls replayed on readiness.
    pub replayed: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            direction: None,
            step: None,
            statement: None,
            reason: None,
            delay_ms: None,
            replayed: None,
        }
    }

    /// Attaches a run direction.
    #[inline]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Attaches a step position.
    #[inline]
    pub fn with_step(mut self, index: usize) -> Self {
        self.step = Some(u32::try_from(index).unwrap_or(u32::MAX));
        self
    }

    /// Attaches statement text.
    #[inline]
    pub fn with_statement(mut self, statement: impl Into<Arc<str>>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an idle delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a replay count.
    #[inline]
    pub fn with_replayed(mut self, n: usize) -> Self {
        self.replayed = Some(u32::try_from(n).unwrap_or(u32::MAX));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }

    /// True for events produced by the subscriber fan-out itself.
    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}
