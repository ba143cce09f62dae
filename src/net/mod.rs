//! Network layer.
//!
//! # Data Flow
//! ```text
//! ListenerConfig
//!     → listener.rs (parse address, bind)
//!     → http::server (accept loop, graceful drain)
//! ```

pub mod listener;

pub use listener::{bind, ListenerError};
