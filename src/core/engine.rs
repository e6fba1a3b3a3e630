//! # Engine: entry points, readiness signal and shared state.
//!
//! The [`Engine`] is created once per process by [`EngineBuilder::build`](super::EngineBuilder::build)
//! together with its [`ReadySignal`]. Callers own both and pass them where needed;
//! nothing is global.
//!
//! ## Call path
//! ```text
//! Engine::up(db)
//!   ├─► idle.reset()                       (a new call is activity)
//!   ├─► gate.guard(send Call)
//!   │      ├─ ready    ─► Call queued to the run loop now
//!   │      └─ not ready─► buffered, CallDeferred published
//!   └─► await reply                        (Result of the run)
//!
//! ReadySignal::ready(host)
//!   ├─► idle.reset()
//!   ├─► host stored (Engine::host)
//!   └─► gate.mark_ready() ─► buffered Calls queued in arrival order
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use migravisor::{Config, Driver, DriverRef, Engine, Param, StatementError};
//!
//! struct Noop;
//!
//! #[async_trait]
//! impl Driver for Noop {
//!     async fn execute(&self, _sql: &str, _params: &[Param]) -> Result<(), StatementError> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (engine, ready) = Engine::builder(Config::default())
//!         .apply("CREATE TABLE users (id INT)", vec![])
//!         .revert("DROP TABLE users", vec![])
//!         .build();
//!
//!     ready.ready(None);
//!     let db: DriverRef = Arc::new(Noop);
//!     engine.up(db).await?;
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    core::{
        builder::EngineBuilder,
        gate::{Admission, ReadinessGate},
        runner::Call,
        sequencer::{Phase, Phases},
        shutdown::IdleTimer,
    },
    error::EngineError,
    events::{Bus, Event, EventKind},
    handles::{DriverRef, HostRef},
    steps::Direction,
};

/// Action run when the idle timer elapses, after the host shut down.
pub type ExitFn = Arc<dyn Fn() + Send + Sync>;

/// State shared by the engine handle, the ready signal and the run loop.
pub(crate) struct Shared {
    pub cfg: Config,
    pub bus: Bus,
    pub gate: ReadinessGate,
    pub idle: Arc<IdleTimer>,
    pub phases: Arc<Phases>,
    pub on_exit: ExitFn,
    host: OnceLock<Option<HostRef>>,
    listener_stop: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    pub(crate) fn new(cfg: Config, bus: Bus, phases: Arc<Phases>, on_exit: ExitFn) -> Self {
        Self {
            idle: Arc::new(IdleTimer::new(bus.clone())),
            gate: ReadinessGate::new(),
            host: OnceLock::new(),
            listener_stop: CancellationToken::new(),
            listener: Mutex::new(None),
            cfg,
            bus,
            phases,
            on_exit,
        }
    }

    /// Host handed over with readiness, if any.
    pub(crate) fn host(&self) -> Option<HostRef> {
        self.host.get().cloned().flatten()
    }

    /// Token the subscriber listener stops on.
    pub(crate) fn listener_stop(&self) -> CancellationToken {
        self.listener_stop.clone()
    }

    pub(crate) fn set_listener(&self, handle: JoinHandle<()>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Stops the subscriber listener once it has handed over every event published
    /// so far, then waits for the subscribers to finish their queues.
    pub(crate) async fn flush_subscribers(&self) {
        self.listener_stop.cancel();
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn mark_ready(&self, host: Option<HostRef>) {
        self.idle.reset();
        let name = host.as_ref().map(|h| h.name().to_string());
        // Stored before replay so replayed runs already see their host.
        if self.host.set(host).is_err() {
            return;
        }
        if let Some(replayed) = self.gate.mark_ready() {
            let mut ev = Event::new(EventKind::ReadySignaled).with_replayed(replayed);
            if let Some(name) = name {
                ev = ev.with_reason(name);
            }
            self.bus.publish(ev);
        }
    }
}

/// Handle to the single engine instance of a process.
///
/// Cheap to clone; all clones drive the same queues.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
    calls: mpsc::UnboundedSender<Call>,
}

impl Engine {
    /// Starts building an engine with the given configuration.
    pub fn builder(cfg: Config) -> EngineBuilder {
        EngineBuilder::new(cfg)
    }

    pub(crate) fn new(shared: Arc<Shared>, calls: mpsc::UnboundedSender<Call>) -> Self {
        Self { shared, calls }
    }

    /// Runs the apply queue. Resolves once the run finished or aborted.
    pub async fn up(&self, db: DriverRef) -> Result<(), EngineError> {
        self.run(Direction::Apply, db).await
    }

    /// Runs the revert queue. Resolves once the run finished or aborted.
    pub async fn down(&self, db: DriverRef) -> Result<(), EngineError> {
        self.run(Direction::Revert, db).await
    }

    /// Runs the queue for `direction`.
    ///
    /// If readiness has not been signalled yet the call is buffered and replayed,
    /// in arrival order, when it is.
    ///
    /// # Errors
    /// - [`EngineError::Statement`], [`EngineError::Continuation`],
    ///   [`EngineError::Completion`] when the run aborts;
    /// - [`EngineError::Misuse`] when the ready signal was dropped without firing.
    pub async fn run(&self, direction: Direction, db: DriverRef) -> Result<(), EngineError> {
        self.shared.idle.reset();

        let (reply, done) = oneshot::channel();
        let call = Call {
            direction,
            db,
            reply,
        };
        let calls = self.calls.clone();
        let admission = self.shared.gate.guard(move || {
            let _ = calls.send(call);
        });

        match admission {
            Admission::Immediate => {}
            Admission::Deferred => self
                .shared
                .bus
                .publish(Event::new(EventKind::CallDeferred).with_direction(direction)),
            Admission::Refused => {
                return Err(EngineError::Misuse {
                    reason: "ready signal dropped before readiness",
                });
            }
        }

        done.await.map_err(|_| EngineError::Misuse {
            reason: "call dropped before it could run",
        })?
    }

    /// True once the ready signal has fired.
    pub fn is_ready(&self) -> bool {
        self.shared.gate.is_ready()
    }

    /// Host handed over with the ready signal, if any.
    pub fn host(&self) -> Option<HostRef> {
        self.shared.host()
    }

    /// Current phase of `direction`.
    pub fn phase(&self, direction: Direction) -> Phase {
        self.shared.phases.get(direction)
    }

    /// True while the idle exit timer is pending.
    pub fn idle_timer_armed(&self) -> bool {
        self.shared.idle.is_armed()
    }

    /// Creates a receiver for subsequent runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.shared.cfg
    }

    /// Writes `message` through `tracing` when verbose output is on.
    pub fn log(&self, message: impl fmt::Display) -> &Self {
        if self.shared.cfg.verbose {
            tracing::info!("{message}");
        }
        self
    }
}

/// One-shot readiness trigger returned by the builder.
///
/// Dropping it without calling [`ready`](Self::ready) abandons every buffered and
/// future call: they resolve to [`EngineError::Misuse`] instead of waiting forever.
pub struct ReadySignal {
    shared: Option<Arc<Shared>>,
}

impl ReadySignal {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared: Some(shared),
        }
    }

    /// Signals that the dependency finished booting.
    ///
    /// `None` means "no dependency, proceed unconditionally"; in that case the engine
    /// owns no host and never arms its idle exit timer.
    pub fn ready(mut self, host: Option<HostRef>) {
        if let Some(shared) = self.shared.take() {
            shared.mark_ready(host);
        }
    }
}

impl Drop for ReadySignal {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            let dropped = shared.gate.abandon();
            if dropped > 0 {
                tracing::warn!(dropped, "ready signal dropped; buffered calls abandoned");
            }
        }
    }
}
