use std::sync::Arc;
use std::time::Duration;

use tokio::{
    select,
    sync::{
        broadcast::error::{RecvError, TryRecvError},
        mpsc,
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use super::{
    engine::{Engine, ExitFn, ReadySignal, Shared},
    runner::RunLoop,
    sequencer::{Phases, Plan, Sequencer},
};
use crate::{
    config::Config,
    events::Bus,
    steps::{Direction, HookRef, Param, Step, StepRegistry},
    subscribers::{Subscribe, SubscriberSet},
};

/// Fluent registration surface for an [`Engine`].
///
/// Every step and hook is registered here, before the engine exists, so a queue can
/// never change while it drains.
///
/// ## Example
/// ```rust
/// use migravisor::{Config, DriverRef, Engine, HookError, HookFn, Param};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (engine, ready) = Engine::builder(Config::default())
///     .verbose(true)
///     .ignore_errors(false)
///     .apply("CREATE TABLE t (id INT)", vec![])
///     .apply_then(
///         "INSERT INTO t VALUES (?)",
///         vec![Param::from(1)],
///         HookFn::arc(|_db: DriverRef| async { Ok::<(), HookError>(()) }),
///     )
///     .revert("DROP TABLE t", vec![])
///     .build();
/// # drop((engine, ready));
/// # }
/// ```
pub struct EngineBuilder {
    cfg: Config,
    registry: StepRegistry,
    on_apply_complete: Option<HookRef>,
    on_revert_complete: Option<HookRef>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    on_exit: Option<ExitFn>,
}

impl EngineBuilder {
    /// Creates a new builder with the given configuration and empty queues.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            registry: StepRegistry::new(),
            on_apply_complete: None,
            on_revert_complete: None,
            subscribers: Vec::new(),
            on_exit: None,
        }
    }

    /// Toggles logging of each dispatched statement.
    pub fn verbose(mut self, on: bool) -> Self {
        self.cfg.verbose = on;
        self
    }

    /// Toggles the error-tolerance policy for statement failures.
    pub fn ignore_errors(mut self, on: bool) -> Self {
        self.cfg.ignore_errors = on;
        self
    }

    /// Sets the quiescent interval before the idle exit (`Duration::ZERO` = never).
    pub fn idle_timeout(mut self, after: Duration) -> Self {
        self.cfg.idle_timeout = after;
        self
    }

    /// Appends a step to the apply queue.
    pub fn apply(self, statement: impl Into<Arc<str>>, params: Vec<Param>) -> Self {
        self.step(Direction::Apply, Step::new(statement, params))
    }

    /// Appends an apply step whose `continuation` must resolve before the next step runs.
    pub fn apply_then(
        self,
        statement: impl Into<Arc<str>>,
        params: Vec<Param>,
        continuation: HookRef,
    ) -> Self {
        self.step(
            Direction::Apply,
            Step::new(statement, params).with_continuation(continuation),
        )
    }

    /// Appends a step to the revert queue.
    pub fn revert(self, statement: impl Into<Arc<str>>, params: Vec<Param>) -> Self {
        self.step(Direction::Revert, Step::new(statement, params))
    }

    /// Appends a revert step whose `continuation` must resolve before the next step runs.
    pub fn revert_then(
        self,
        statement: impl Into<Arc<str>>,
        params: Vec<Param>,
        continuation: HookRef,
    ) -> Self {
        self.step(
            Direction::Revert,
            Step::new(statement, params).with_continuation(continuation),
        )
    }

    /// Appends a prepared step to the queue for `direction`.
    pub fn step(mut self, direction: Direction, step: Step) -> Self {
        self.registry.enqueue(direction, step);
        self
    }

    /// Installs the hook awaited after the apply queue drains (replaces any previous one).
    pub fn on_apply_complete(mut self, hook: HookRef) -> Self {
        self.on_apply_complete = Some(hook);
        self
    }

    /// Installs the hook awaited after the revert queue drains (replaces any previous one).
    pub fn on_revert_complete(mut self, hook: HookRef) -> Self {
        self.on_revert_complete = Some(hook);
        self
    }

    /// Sets event subscribers for observability.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the action run when the idle timer elapses.
    ///
    /// Defaults to `std::process::exit(0)`.
    pub fn on_idle_exit<F>(mut self, exit: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_exit = Some(Arc::new(exit));
        self
    }

    /// Builds the engine and its ready signal.
    ///
    /// Spawns the run loop (and the subscriber listener, if any subscribers were set),
    /// so this must be called from within a tokio runtime.
    pub fn build(self) -> (Engine, ReadySignal) {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let phases = Arc::new(Phases::default());
        let on_exit = self
            .on_exit
            .unwrap_or_else(|| {
                Arc::new(|| {
                    std::process::exit(0);
                })
            });

        let shared = Arc::new(Shared::new(
            self.cfg,
            bus.clone(),
            Arc::clone(&phases),
            on_exit,
        ));

        if !self.subscribers.is_empty() {
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            shared.set_listener(subscriber_listener(&bus, set, shared.listener_stop()));
        }

        let sequencer = Sequencer::new(
            Plan {
                registry: self.registry,
                on_apply_complete: self.on_apply_complete,
                on_revert_complete: self.on_revert_complete,
            },
            shared.cfg.ignore_errors,
            shared.cfg.verbose,
            bus,
            Arc::clone(&shared.idle),
            phases,
        );

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(RunLoop::new(sequencer, Arc::clone(&shared), rx).run());

        (Engine::new(Arc::clone(&shared), tx), ReadySignal::new(shared))
    }
}

/// Subscribes to the bus and forwards events to the subscriber set.
///
/// On `stop`, events already on the bus are still delivered before the set shuts down.
fn subscriber_listener(
    bus: &Bus,
    set: SubscriberSet,
    stop: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = stop.cancelled() => {
                    loop {
                        match rx.try_recv() {
                            Ok(ev) => set.emit(&ev),
                            Err(TryRecvError::Lagged(_)) => continue,
                            Err(_) => break,
                        }
                    }
                    break;
                }
            }
        }
        set.shutdown().await;
    })
}
