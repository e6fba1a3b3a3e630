//! # Run loop: executes admitted calls one after another.
//!
//! Calls leave the [`ReadinessGate`](super::gate::ReadinessGate) through an unbounded
//! FIFO channel. A single task owns the [`Sequencer`] (and therefore the step queues)
//! and serves that channel, so two runs never overlap and arrival order is kept.
//!
//! ```text
//! Engine::up/down ─► gate.guard(send Call) ─► [mpsc] ─► RunLoop::run()
//!                                                        ├─► idle.reset()
//!                                                        ├─► sequencer.run(direction, db)
//!                                                        ├─► Ok: arm idle timer (if a host is owned)
//!                                                        │        └─► on fire: host.shutdown, flush subscribers, exit
//!                                                        └─► reply to caller
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::{
    core::{engine::Shared, sequencer::Sequencer},
    error::EngineError,
    handles::{DriverRef, HostRef},
    steps::Direction,
};

/// One `up`/`down` request.
pub(crate) struct Call {
    pub direction: Direction,
    pub db: DriverRef,
    pub reply: oneshot::Sender<Result<(), EngineError>>,
}

/// Serves calls until every sender is gone.
pub(crate) struct RunLoop {
    sequencer: Sequencer,
    shared: Arc<Shared>,
    rx: mpsc::UnboundedReceiver<Call>,
}

impl RunLoop {
    pub(crate) fn new(
        sequencer: Sequencer,
        shared: Arc<Shared>,
        rx: mpsc::UnboundedReceiver<Call>,
    ) -> Self {
        Self {
            sequencer,
            shared,
            rx,
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(call) = self.rx.recv().await {
            self.shared.idle.reset();
            let res = self.sequencer.run(call.direction, call.db).await;
            if res.is_ok() {
                self.arm_if_owned();
            }
            let _ = call.reply.send(res);
        }
    }

    /// Arms the idle exit timer when a host was handed over with readiness.
    fn arm_if_owned(&self) {
        let Some(after) = self.shared.cfg.idle_timeout() else {
            return;
        };
        let Some(host) = self.shared.host() else {
            return;
        };
        self.shared
            .idle
            .arm(after, shutdown_and_exit(Arc::clone(&self.shared), host));
    }
}

/// Shuts the host down, lets subscribers see the final events, then exits.
async fn shutdown_and_exit(shared: Arc<Shared>, host: HostRef) {
    if let Err(e) = host.shutdown().await {
        tracing::warn!(host = host.name(), error = %e, "host shutdown failed; exiting anyway");
    }
    shared.flush_subscribers().await;
    (shared.on_exit)();
}
