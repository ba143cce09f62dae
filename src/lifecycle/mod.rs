//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listener → Build tracker/server/coordinator → Start accepting
//!
//! Requests (tasks.rs):
//!     Handler → BackgroundTaskTracker::spawn → detached, panic-isolated task
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → TerminationSignal on a channel
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections
//!         → Wait for background tasks → Stopped | ForcedStop
//! ```
//!
//! # Design Decisions
//! - Ordered startup: listener first, then core, then accept loop
//! - Ordered shutdown: stop accept before waiting on background work
//! - Shutdown has timeout: forced stop after deadline

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod tasks;

pub use shutdown::{ShutdownCoordinator, ShutdownError, ShutdownState};
pub use signals::{SignalListener, SignalTrigger, TerminationSignal};
pub use startup::Application;
pub use tasks::BackgroundTaskTracker;
