//! Runtime core: readiness, sequencing and idle shutdown.
//!
//! Internal modules:
//! - [`gate`]: buffers calls until the ready signal, replays them in arrival order;
//! - [`runner`]: the single run loop that serves admitted calls one at a time;
//! - [`sequencer`]: drains one direction queue with continuations and error policy;
//! - [`shutdown`]: the idle exit timer (at most one pending);
//! - [`engine`] / [`builder`]: public entry points and registration surface.

mod builder;
mod engine;
mod gate;
mod runner;
mod sequencer;
mod shutdown;

pub use builder::EngineBuilder;
pub use engine::{Engine, ExitFn, ReadySignal};
pub use gate::{Admission, ReadinessGate};
pub use sequencer::Phase;
pub use shutdown::IdleTimer;
