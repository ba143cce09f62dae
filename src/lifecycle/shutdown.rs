//! Shutdown coordination for the API server.
//!
//! # State Machine
//! ```text
//! Running ──signal──▶ Draining ──acceptor closed + tasks done──▶ Stopped
//!                        │
//!                        └──deadline elapsed──▶ ForcedStop
//! ```
//!
//! The drain deadline covers both closing the acceptor and waiting for
//! background tasks. A coordinator runs exactly one drain and is consumed.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::time;

use crate::config::ShutdownConfig;
use crate::http::server::ServerHandle;
use crate::lifecycle::signals::SignalListener;
use crate::lifecycle::tasks::BackgroundTaskTracker;

/// Where the process is in its shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
    ForcedStop,
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownState::Running => "running",
            ShutdownState::Draining => "draining",
            ShutdownState::Stopped => "stopped",
            ShutdownState::ForcedStop => "forced_stop",
        };
        f.write_str(name)
    }
}

/// Fatal outcomes of a server's lifetime.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The acceptor failed for a reason other than our own shutdown.
    #[error("acceptor failed: {0}")]
    Acceptor(#[source] io::Error),

    /// Connections or background tasks outlived the drain deadline.
    #[error("graceful shutdown exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
}

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel the acceptor subscribes to, and drives the
/// drain once a termination signal arrives.
pub struct ShutdownCoordinator {
    deadline: Duration,
    tasks: BackgroundTaskTracker,
    drain_tx: broadcast::Sender<()>,
    state_tx: watch::Sender<ShutdownState>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new(config: &ShutdownConfig, tasks: BackgroundTaskTracker) -> Self {
        Self::with_deadline(config.timeout(), tasks)
    }

    pub fn with_deadline(deadline: Duration, tasks: BackgroundTaskTracker) -> Self {
        let (drain_tx, _) = broadcast::channel(1);
        let (state_tx, _) = watch::channel(ShutdownState::Running);
        Self {
            deadline,
            tasks,
            drain_tx,
            state_tx,
        }
    }

    /// Subscribe to the drain notification. Subscribe before `run`.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.drain_tx.subscribe()
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<ShutdownState> {
        self.state_tx.subscribe()
    }

    fn transition(&self, next: ShutdownState) {
        let previous = self.state_tx.send_replace(next);
        tracing::debug!(from = %previous, to = %next, "Shutdown state changed");
    }

    /// Serve until the first termination signal, then drain.
    ///
    /// Returns `Ok` only after the acceptor has closed and every background
    /// task has finished within the deadline.
    pub async fn run(
        self,
        mut server: ServerHandle,
        mut signals: SignalListener,
    ) -> Result<(), ShutdownError> {
        let addr = server.local_addr();

        let signal = tokio::select! {
            result = server.closed() => {
                // Closed without being asked to: fatal, no drain.
                let err = match result {
                    Ok(()) => io::Error::other("acceptor closed unexpectedly"),
                    Err(e) => e,
                };
                tracing::error!(address = %addr, error = %err, "Acceptor failed");
                return Err(ShutdownError::Acceptor(err));
            }
            Some(signal) = signals.recv() => signal,
        };

        tracing::info!(signal = %signal, "shutting down server");
        self.transition(ShutdownState::Draining);
        let _ = self.drain_tx.send(());

        let drain = async {
            let acceptor = server.closed().await;

            tracing::info!(address = %addr, "completing background tasks");
            self.tasks.wait().await;
            acceptor
        };
        tokio::pin!(drain);

        let deadline = time::sleep(self.deadline);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                result = &mut drain => break Some(result),
                _ = &mut deadline => break None,
                Some(repeat) = signals.recv() => {
                    tracing::warn!(signal = %repeat, "Already draining, ignoring repeated signal");
                }
            }
        };

        match outcome {
            Some(Ok(())) => {
                self.transition(ShutdownState::Stopped);
                tracing::info!(address = %addr, "stopped server");
                Ok(())
            }
            Some(Err(e)) => {
                self.transition(ShutdownState::ForcedStop);
                tracing::error!(address = %addr, error = %e, "Acceptor failed while draining");
                Err(ShutdownError::Acceptor(e))
            }
            None => {
                self.transition(ShutdownState::ForcedStop);
                tracing::error!(
                    address = %addr,
                    deadline = ?self.deadline,
                    outstanding_tasks = self.tasks.outstanding(),
                    "Graceful shutdown deadline exceeded"
                );
                Err(ShutdownError::DeadlineExceeded(self.deadline))
            }
        }
    }
}
