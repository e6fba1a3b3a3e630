//! # Sequencer: drains one direction queue, strictly one step at a time.
//!
//! ## Per-direction state machine
//! ```text
//! Idle ──► Draining ──► (AwaitingContinuation ⇄ Draining) ──► Finishing ──► Done
//!              │                    │                             │
//!              └────── fatal error ─┴─────────────────────────────┴──► Aborted
//! ```
//!
//! ## Step flow
//! ```text
//! loop {
//!   ├─► dequeue head            (empty ─► Finishing)
//!   ├─► idle.reset()            (a dispatch is activity)
//!   ├─► driver.execute(statement, params).await
//!   │      ├─ Ok                 ─► StepSucceeded
//!   │      ├─ Err, ignore_errors ─► StepErrorIgnored, continue as success
//!   │      └─ Err                ─► Aborted, return Statement error
//!   └─► continuation? ─► AwaitingContinuation ─► hook.call(db).await
//! }
//! Finishing ─► completion hook (if any) ─► Done
//! ```
//!
//! ## Rules
//! - Step *k+1* is never dispatched before step *k*'s driver call **and**
//!   continuation have both resolved.
//! - The completion hook runs at most once per run, and only after a full drain.
//! - Continuation and completion-hook errors are always fatal.
//! - A panic in the driver or a hook aborts the run like any other fatal error;
//!   the run loop keeps serving later calls.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;

use crate::{
    core::shutdown::IdleTimer,
    error::{EngineError, panic_message},
    events::{Bus, Event, EventKind},
    handles::DriverRef,
    steps::{Direction, HookRef, Step, StepRegistry},
};

/// Observable phase of one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Queue not yet started.
    #[default]
    Idle,
    /// Dispatching steps.
    Draining,
    /// Waiting on a step continuation.
    AwaitingContinuation,
    /// Queue drained; completion hook running.
    Finishing,
    /// Run completed successfully.
    Done,
    /// Run stopped on a fatal error.
    Aborted,
}

/// Phase per direction, readable from outside the run loop.
#[derive(Default)]
pub(crate) struct Phases {
    apply: Mutex<Phase>,
    revert: Mutex<Phase>,
}

impl Phases {
    pub(crate) fn get(&self, direction: Direction) -> Phase {
        *self.slot(direction)
    }

    fn set(&self, direction: Direction, phase: Phase) {
        *self.slot(direction) = phase;
    }

    fn slot(&self, direction: Direction) -> MutexGuard<'_, Phase> {
        let m = match direction {
            Direction::Apply => &self.apply,
            Direction::Revert => &self.revert,
        };
        m.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration-time content handed from the builder to the sequencer.
pub(crate) struct Plan {
    pub registry: StepRegistry,
    pub on_apply_complete: Option<HookRef>,
    pub on_revert_complete: Option<HookRef>,
}

/// Owns the step queues and drains them.
pub(crate) struct Sequencer {
    plan: Plan,
    /// Steps already taken from each queue (apply, revert).
    taken: [usize; 2],
    ignore_errors: bool,
    verbose: bool,
    bus: Bus,
    idle: Arc<IdleTimer>,
    phases: Arc<Phases>,
}

impl Sequencer {
    pub(crate) fn new(
        plan: Plan,
        ignore_errors: bool,
        verbose: bool,
        bus: Bus,
        idle: Arc<IdleTimer>,
        phases: Arc<Phases>,
    ) -> Self {
        Self {
            plan,
            taken: [0, 0],
            ignore_errors,
            verbose,
            bus,
            idle,
            phases,
        }
    }

    /// Drains `direction` and runs its completion phase.
    pub(crate) async fn run(
        &mut self,
        direction: Direction,
        db: DriverRef,
    ) -> Result<(), EngineError> {
        self.bus
            .publish(Event::new(EventKind::RunStarted).with_direction(direction));

        let drained = AssertUnwindSafe(self.drain(direction, &db))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let reason = panic_message(payload.as_ref());
                tracing::error!(%direction, %reason, "run panicked");
                Err(EngineError::Panicked { direction, reason })
            });

        match drained {
            Ok(()) => {
                self.phases.set(direction, Phase::Done);
                self.bus
                    .publish(Event::new(EventKind::RunFinished).with_direction(direction));
                Ok(())
            }
            Err(err) => {
                self.phases.set(direction, Phase::Aborted);
                let mut ev = Event::new(EventKind::RunAborted)
                    .with_direction(direction)
                    .with_reason(err.as_message());
                if let EngineError::Statement { index, .. }
                | EngineError::Continuation { index, .. } = &err
                {
                    ev = ev.with_step(*index);
                }
                self.bus.publish(ev);
                Err(err)
            }
        }
    }

    async fn drain(&mut self, direction: Direction, db: &DriverRef) -> Result<(), EngineError> {
        self.phases.set(direction, Phase::Draining);

        while let Some(step) = self.plan.registry.dequeue(direction) {
            let index = self.next_index(direction);
            let has_next = !self.plan.registry.is_empty(direction);
            self.dispatch(direction, index, &step, has_next, db).await?;

            if let Some(continuation) = step.continuation() {
                self.phases.set(direction, Phase::AwaitingContinuation);
                self.bus.publish(
                    Event::new(EventKind::ContinuationAwaited)
                        .with_direction(direction)
                        .with_step(index),
                );
                continuation
                    .call(Arc::clone(db))
                    .await
                    .map_err(|source| EngineError::Continuation {
                        direction,
                        index,
                        source,
                    })?;
                self.phases.set(direction, Phase::Draining);
            }
        }

        self.finish(direction, db).await
    }

    /// Sends one statement to the driver and applies the error policy.
    async fn dispatch(
        &self,
        direction: Direction,
        index: usize,
        step: &Step,
        has_next: bool,
        db: &DriverRef,
    ) -> Result<(), EngineError> {
        self.idle.reset();
        self.log(format_args!(
            "{direction}[{index}] {} {:?} ({})",
            step.statement(),
            step.params(),
            if has_next { "next" } else { "last" },
        ));
        self.bus.publish(
            Event::new(EventKind::StepDispatched)
                .with_direction(direction)
                .with_step(index)
                .with_statement(step.statement()),
        );

        match db.execute(step.statement(), step.params()).await {
            Ok(()) => {
                self.bus.publish(
                    Event::new(EventKind::StepSucceeded)
                        .with_direction(direction)
                        .with_step(index),
                );
                Ok(())
            }
            Err(source) if self.ignore_errors => {
                if self.verbose {
                    tracing::warn!("{direction}[{index}] ignored error: {source}");
                }
                self.bus.publish(
                    Event::new(EventKind::StepErrorIgnored)
                        .with_direction(direction)
                        .with_step(index)
                        .with_reason(source.message),
                );
                Ok(())
            }
            Err(source) => Err(EngineError::Statement {
                direction,
                index,
                statement: step.statement().to_string(),
                source,
            }),
        }
    }

    async fn finish(&self, direction: Direction, db: &DriverRef) -> Result<(), EngineError> {
        self.phases.set(direction, Phase::Finishing);
        self.log(format_args!("finishing {direction}"));

        let hook = match direction {
            Direction::Apply => self.plan.on_apply_complete.as_ref(),
            Direction::Revert => self.plan.on_revert_complete.as_ref(),
        };
        if let Some(hook) = hook {
            self.log("running completion hook");
            hook.call(Arc::clone(db))
                .await
                .map_err(|source| EngineError::Completion { direction, source })?;
        }
        Ok(())
    }

    fn next_index(&mut self, direction: Direction) -> usize {
        let slot = match direction {
            Direction::Apply => &mut self.taken[0],
            Direction::Revert => &mut self.taken[1],
        };
        let index = *slot;
        *slot += 1;
        index
    }

    fn log(&self, message: impl fmt::Display) {
        if self.verbose {
            tracing::info!("{message}");
        }
    }
}
