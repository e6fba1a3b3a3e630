//! # Idle exit timer.
//!
//! A migration run is usually a one-shot process. Left alone, the host's event loop
//! could keep it alive forever; exiting right after a run would race with buffered
//! readiness replays and late calls. [`IdleTimer`] sits in between: after a run
//! finishes it schedules the exit action, and any activity disarms it first.
//!
//! ```text
//! run finished ──► arm(3s) ──────────────────────► elapsed ─► on_idle (host shutdown + exit)
//!                      │
//!    activity ─► reset ┘  (cancelled, nothing fires)
//! ```
//!
//! ## Rules
//! - At most one timer is pending at any instant: `arm` cancels the previous timer
//!   under the same lock that installs the new one.
//! - A timer that elapses concurrently with `reset` does not fire: the firing task
//!   must still own the slot (matching generation) when it wakes.
//! - Firing clears the slot before `on_idle` runs.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};

#[derive(Default)]
struct Slot {
    generation: u64,
    armed: Option<(u64, CancellationToken)>,
}

/// Cancellable one-shot idle timer.
pub struct IdleTimer {
    slot: Mutex<Slot>,
    bus: Bus,
}

impl IdleTimer {
    /// Creates a disarmed timer publishing to `bus`.
    pub fn new(bus: Bus) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            bus,
        }
    }

    /// Cancels the pending timer, if any.
    ///
    /// Returns `true` if a timer was cancelled.
    pub fn reset(&self) -> bool {
        let prev = self.lock().armed.take();
        match prev {
            Some((_, token)) => {
                token.cancel();
                self.bus.publish(Event::new(EventKind::IdleTimerCancelled));
                true
            }
            None => false,
        }
    }

    /// Cancels any pending timer, then schedules `on_idle` to run after `after`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(self: &Arc<Self>, after: Duration, on_idle: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let (generation, prev) = {
            let mut slot = self.lock();
            slot.generation += 1;
            let generation = slot.generation;
            let prev = slot.armed.replace((generation, token.clone()));
            (generation, prev)
        };
        if let Some((_, old)) = prev {
            old.cancel();
            self.bus.publish(Event::new(EventKind::IdleTimerCancelled));
        }
        self.bus
            .publish(Event::new(EventKind::IdleTimerArmed).with_delay(after));

        let me = Arc::clone(self);
        tokio::spawn(async move {
            select! {
                biased;
                _ = token.cancelled() => {}
                _ = time::sleep(after) => {
                    if me.disarm(generation) {
                        me.bus.publish(Event::new(EventKind::IdleTimeoutElapsed));
                        on_idle.await;
                    }
                }
            }
        });
    }

    /// True while a timer is pending.
    pub fn is_armed(&self) -> bool {
        self.lock().armed.is_some()
    }

    /// Clears the slot if it still belongs to `generation`.
    fn disarm(&self, generation: u64) -> bool {
        let mut slot = self.lock();
        match slot.armed {
            Some((g, _)) if g == generation => {
                slot.armed = None;
                true
            }
            _ => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let make = move || {
            let h = Arc::clone(&h);
            Box::pin(async move {
                h.fetch_add(1, Ordering::SeqCst);
            }) as std::pin::Pin<Box<dyn Future<Output = ()> + Send>>
        };
        (hits, make)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_quiet_interval() {
        let timer = Arc::new(IdleTimer::new(Bus::new(16)));
        let (hits, make) = counter();

        timer.arm(Duration::from_secs(3), make());
        assert!(timer.is_armed());

        time::sleep(Duration::from_millis(2999)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_prevents_firing() {
        let timer = Arc::new(IdleTimer::new(Bus::new(16)));
        let (hits, make) = counter();

        timer.arm(Duration::from_secs(3), make());
        time::sleep(Duration::from_secs(1)).await;
        assert!(timer.reset());
        assert!(!timer.reset());

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_pending_timer() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let timer = Arc::new(IdleTimer::new(bus));
        let (hits, make) = counter();

        timer.arm(Duration::from_secs(3), make());
        time::sleep(Duration::from_secs(2)).await;
        timer.arm(Duration::from_secs(3), make());

        // The first deadline passes without firing.
        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            [
                EventKind::IdleTimerArmed,
                EventKind::IdleTimerCancelled,
                EventKind::IdleTimerArmed,
                EventKind::IdleTimeoutElapsed,
            ]
        );
    }
}
