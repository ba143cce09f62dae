//! OS signal handling.
//!
//! # Responsibilities
//! - Register termination signal handlers (SIGINT, SIGTERM) once
//! - Translate signals to internal events on a channel
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - One long-lived listener task; it is never re-armed per signal
//! - The channel lets tests and embedders inject signals without the OS

use std::fmt;

use tokio::sync::mpsc;

/// A request from the host to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("interrupt"),
            TerminationSignal::Terminate => f.write_str("terminated"),
        }
    }
}

/// Receiving end for termination signals.
#[derive(Debug)]
pub struct SignalListener {
    rx: mpsc::UnboundedReceiver<TerminationSignal>,
}

/// Sending end used to inject termination signals by hand.
#[derive(Debug, Clone)]
pub struct SignalTrigger {
    tx: mpsc::UnboundedSender<TerminationSignal>,
}

impl SignalTrigger {
    /// Deliver `signal`. Returns false once the listener is gone.
    pub fn send(&self, signal: TerminationSignal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

impl SignalListener {
    /// A listener fed only by the returned trigger.
    pub fn manual() -> (SignalTrigger, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SignalTrigger { tx }, Self { rx })
    }

    /// Subscribe to process termination signals.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn install() -> std::io::Result<Self> {
        let (trigger, listener) = Self::manual();
        spawn_os_listener(trigger)?;
        Ok(listener)
    }

    /// Next termination signal, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<TerminationSignal> {
        self.rx.recv().await
    }
}

#[cfg(unix)]
fn spawn_os_listener(trigger: SignalTrigger) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = interrupt.recv() => TerminationSignal::Interrupt,
                Some(()) = terminate.recv() => TerminationSignal::Terminate,
                else => break,
            };
            if !trigger.send(received) {
                break;
            }
        }
        tracing::debug!("Signal listener stopped");
    });

    Ok(())
}

#[cfg(not(unix))]
fn spawn_os_listener(trigger: SignalTrigger) -> std::io::Result<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !trigger.send(TerminationSignal::Interrupt) {
                break;
            }
        }
        tracing::debug!("Signal listener stopped");
    });

    Ok(())
}
