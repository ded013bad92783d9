//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Metrics → Registry → Watcher → Admin → Gateway listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → servers stop accepting → drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: bind and watch errors at startup are fatal
//! - Listeners start last (traffic only when guards exist)

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, StartupError};
