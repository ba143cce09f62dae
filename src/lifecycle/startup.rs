//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the listener and fail fast if that is impossible
//! - Build the task tracker, server and shutdown coordinator in order
//! - Hand the running server over to the coordinator
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds before anything is spawned, so a bind failure is
//!   reported without any drain

use std::io;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::AppConfig;
use crate::error::Result;
use crate::http::server::{AppState, HttpServer};
use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownState};
use crate::lifecycle::signals::SignalListener;
use crate::lifecycle::tasks::BackgroundTaskTracker;
use crate::net;

/// A bound, not yet serving application.
pub struct Application {
    listener: TcpListener,
    server: HttpServer,
    coordinator: ShutdownCoordinator,
}

impl Application {
    /// Bind the listener and assemble every subsystem.
    pub async fn build(config: AppConfig) -> Result<Self> {
        let listener = net::bind(&config.listener).await?;

        let tasks = BackgroundTaskTracker::new();
        let coordinator = ShutdownCoordinator::new(&config.shutdown, tasks.clone());
        let server = HttpServer::new(config, tasks);

        Ok(Self {
            listener,
            server,
            coordinator,
        })
    }

    /// Add resource routes.
    pub fn with_routes(mut self, routes: Router<AppState>) -> Self {
        self.server = self.server.with_routes(routes);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn tasks(&self) -> &BackgroundTaskTracker {
        &self.server.state().tasks
    }

    pub fn shutdown_state(&self) -> watch::Receiver<ShutdownState> {
        self.coordinator.state()
    }

    /// Serve until a termination signal, then drain.
    pub async fn run(self, signals: SignalListener) -> Result<()> {
        let drain = self.coordinator.subscribe();
        let handle = self.server.spawn(self.listener, drain)?;
        self.coordinator.run(handle, signals).await?;
        Ok(())
    }
}

/// Build and run with the built-in routes only.
pub async fn run(config: AppConfig, signals: SignalListener) -> Result<()> {
    Application::build(config).await?.run(signals).await
}
