//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (derive client key: peer IP or trusted forwarding header)
//!     → rate_limit.rs (per-client token bucket, 429 on exhaustion)
//!     → Pass to handlers
//! ```
//!
//! # Design Decisions
//! - Admission is decided immediately; nothing is queued
//! - Limiter state is process-local and in memory only
//! - No trust in client-supplied forwarding headers unless configured

pub mod headers;
pub mod rate_limit;
pub mod token_bucket;

pub use headers::{client_key, ClientKeyError};
pub use rate_limit::{rate_limit_middleware, ClientLimiterRegistry};
pub use token_bucket::TokenBucket;
