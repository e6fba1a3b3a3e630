//! # LogWriter: event printer over `tracing`
//!
//! A small subscriber that renders incoming [`Event`]s as `tracing` records.
//! Use it for demos or while debugging a migration that stalls.
//!
//! ## Example output
//! ```text
//! [deferred] direction=apply
//! [ready] replayed=1 host="app"
//! [dispatch] apply#0 "INSERT A"
//! [ignored] apply#1 err="duplicate key"
//! [finished] direction=apply
//! [idle-armed] delay_ms=3000
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let dir = e.direction.map(|d| d.as_str()).unwrap_or("-");
        let step = e.step.unwrap_or_default();
        match e.kind {
            EventKind::CallDeferred => tracing::info!("[deferred] direction={dir}"),
            EventKind::ReadySignaled => {
                tracing::info!("[ready] replayed={:?} host={:?}", e.replayed, e.reason)
            }
            EventKind::RunStarted => tracing::info!("[started] direction={dir}"),
            EventKind::StepDispatched => {
                tracing::info!("[dispatch] {dir}#{step} {:?}", e.statement)
            }
            EventKind::StepSucceeded => tracing::debug!("[ok] {dir}#{step}"),
            EventKind::StepErrorIgnored => {
                tracing::warn!("[ignored] {dir}#{step} err={:?}", e.reason)
            }
            EventKind::ContinuationAwaited => tracing::debug!("[continuation] {dir}#{step}"),
            EventKind::RunFinished => tracing::info!("[finished] direction={dir}"),
            EventKind::RunAborted => {
                tracing::error!("[aborted] direction={dir} err={:?}", e.reason)
            }
            EventKind::IdleTimerArmed => tracing::debug!("[idle-armed] delay_ms={:?}", e.delay_ms),
            EventKind::IdleTimerCancelled => tracing::debug!("[idle-cancelled]"),
            EventKind::IdleTimeoutElapsed => tracing::info!("[idle-exit]"),
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                tracing::warn!("[subscriber] {:?} {:?}", e.kind, e.reason)
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
