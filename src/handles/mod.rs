//! # External collaborators.
//!
//! The engine never opens connections or boots hosts itself; callers hand them in:
//! - [`Driver`] - data-access handle that executes one statement at a time
//! - [`Host`] - readiness dependency, shut down when the engine goes idle

mod driver;
mod host;

pub use driver::{Driver, DriverRef};
pub use host::{Host, HostRef};
