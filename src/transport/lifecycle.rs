//! Graceful shutdown
//!
//! RUNNING → DRAINING → STOPPED. Draining closes every registered session
//! concurrently, each bounded by a timeout, and removes it from the registry
//! whatever the outcome of its close.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::registry::{CloseReason, SessionRegistry};

/// Process lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    Draining,
    Stopped,
}

/// What asked the process to stop. Every trigger drains the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// SIGINT / Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
}

/// Outcome of a drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Sessions closed cleanly
    pub closed: usize,
    /// Sessions whose close returned an error
    pub failed: usize,
    /// Sessions whose close did not finish in time
    pub timed_out: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.closed + self.failed + self.timed_out
    }
}

/// Coordinates shutdown of every open session
pub struct Lifecycle {
    registry: Arc<SessionRegistry>,
    drain_timeout: Duration,
    state: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    pub fn new(registry: Arc<SessionRegistry>, drain_timeout: Duration) -> Self {
        let (state, _) = watch::channel(LifecycleState::Running);
        Lifecycle {
            registry,
            drain_timeout,
            state,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Wait for `trigger`, then drain.
    pub async fn shutdown_on<F>(&self, trigger: F) -> DrainReport
    where
        F: Future<Output = ShutdownTrigger>,
    {
        let trigger = trigger.await;
        info!(?trigger, "Shutting down SSE server...");
        self.drain().await
    }

    /// Close every open session and enter STOPPED.
    ///
    /// Only the first call drains; later calls return an empty report.
    pub async fn drain(&self) -> DrainReport {
        let entered = self.state.send_if_modified(|state| {
            if *state == LifecycleState::Running {
                *state = LifecycleState::Draining;
                true
            } else {
                false
            }
        });
        if !entered {
            return DrainReport::default();
        }

        let sessions = self.registry.list();
        info!(count = sessions.len(), "Draining sessions");

        let outcomes = join_all(sessions.iter().map(|session| async move {
            info!(session_id = %session.id(), "Closing transport for session");
            let outcome = tokio::time::timeout(
                self.drain_timeout,
                self.registry.close(session, CloseReason::Shutdown),
            )
            .await;
            // Closing may have been cut short; the entry goes regardless
            self.registry.remove_if_current(session);
            (session.id().clone(), outcome)
        }))
        .await;

        let mut report = DrainReport::default();
        for (session_id, outcome) in outcomes {
            match outcome {
                Ok(Ok(())) => report.closed += 1,
                Ok(Err(e)) => {
                    error!(%session_id, "Error closing transport for session: {}", e);
                    report.failed += 1;
                }
                Err(_) => {
                    warn!(
                        %session_id,
                        timeout_ms = self.drain_timeout.as_millis() as u64,
                        "Timed out closing transport for session"
                    );
                    report.timed_out += 1;
                }
            }
        }

        self.state.send_replace(LifecycleState::Stopped);
        info!(
            closed = report.closed,
            failed = report.failed,
            timed_out = report.timed_out,
            "Session drain complete"
        );
        report
    }
}

/// Resolve on SIGINT or SIGTERM, whichever comes first.
pub async fn termination_signal() -> ShutdownTrigger {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => ShutdownTrigger::Interrupt,
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
            ShutdownTrigger::Terminate
        }
    }
}
