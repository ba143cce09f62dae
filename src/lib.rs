//! Flick API server library: per-client admission control, background
//! task tracking and graceful shutdown around an Axum HTTP service.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use http::HttpServer;
pub use lifecycle::{Application, BackgroundTaskTracker, ShutdownCoordinator};
pub use security::ClientLimiterRegistry;
