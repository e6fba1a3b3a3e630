//! # Readiness gate: buffer calls until an external dependency is up.
//!
//! Execution may be requested before the host has finished booting. The gate keeps
//! such requests as deferred actions and replays them, once and in arrival order,
//! when [`ReadinessGate::mark_ready`] fires.
//!
//! ```text
//!  guard(a1) ──► [a1]            (not ready: stored)
//!  guard(a2) ──► [a1, a2]
//!  mark_ready ─► a1(), a2()      (replayed under the gate lock)
//!  guard(a3) ──► a3()            (ready: runs immediately)
//! ```
//!
//! ## Rules
//! - The ready transition happens at most once; later calls are no-ops.
//! - Replay runs while the gate lock is held, so a `guard` racing with the
//!   transition can never overtake a buffered action. Actions must therefore be
//!   short, non-blocking and must not call back into the gate.
//! - After [`ReadinessGate::abandon`], buffered actions are dropped without running
//!   and new actions are refused.

use std::sync::{Mutex, MutexGuard, PoisonError};

type Deferred = Box<dyn FnOnce() + Send>;

/// What `guard` did with an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The gate was open; the action already ran.
    Immediate,
    /// The gate is closed; the action is buffered for replay.
    Deferred,
    /// The gate was abandoned; the action was dropped.
    Refused,
}

#[derive(Default)]
struct GateState {
    ready: bool,
    abandoned: bool,
    pending: Vec<Deferred>,
}

/// One-way gate with an ordered replay list.
#[derive(Default)]
pub struct ReadinessGate {
    state: Mutex<GateState>,
}

impl ReadinessGate {
    /// Creates a closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// True once [`mark_ready`](Self::mark_ready) has fired.
    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    /// Number of actions waiting for readiness.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Runs `action` now if the gate is open, otherwise buffers it.
    pub fn guard<F>(&self, action: F) -> Admission
    where
        F: FnOnce() + Send + 'static,
    {
        let mut st = self.lock();
        if st.ready {
            drop(st);
            action();
            Admission::Immediate
        } else if st.abandoned {
            drop(st);
            drop(action);
            Admission::Refused
        } else {
            st.pending.push(Box::new(action));
            Admission::Deferred
        }
    }

    /// Opens the gate and replays buffered actions in arrival order.
    ///
    /// Returns the number of replayed actions, or `None` if the gate was already
    /// open or abandoned.
    pub fn mark_ready(&self) -> Option<usize> {
        let mut st = self.lock();
        if st.ready || st.abandoned {
            return None;
        }
        st.ready = true;
        let pending = std::mem::take(&mut st.pending);
        let replayed = pending.len();
        for action in pending {
            action();
        }
        Some(replayed)
    }

    /// Gives up on readiness: drops buffered actions and refuses new ones.
    ///
    /// Returns the number of dropped actions. No-op once the gate is open.
    pub fn abandon(&self) -> usize {
        let dropped = {
            let mut st = self.lock();
            if st.ready {
                return 0;
            }
            st.abandoned = true;
            std::mem::take(&mut st.pending)
        };
        dropped.len()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
