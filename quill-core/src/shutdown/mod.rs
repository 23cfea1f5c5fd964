//! Graceful shutdown coordinator

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

/// Shutdown state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Shutdown,
}

/// Graceful shutdown coordinator
///
/// Long-running tasks either poll [`ShutdownCoordinator::is_shutting_down`]
/// between units of work or await [`ShutdownCoordinator::wait_for_shutdown`].
pub struct ShutdownCoordinator {
    state: Arc<RwLock<ShutdownState>>,
    shutdown_tx: broadcast::Sender<()>,
    grace_period: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(grace_period: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            state: Arc::new(RwLock::new(ShutdownState::Running)),
            shutdown_tx,
            grace_period,
        }
    }

    /// How long in-flight work is given after the signal
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Raise the shutdown signal without waiting
    ///
    /// Returns false if shutdown was already in progress.
    pub async fn trigger(&self) -> bool {
        let mut state = self.state.write().await;
        if *state != ShutdownState::Running {
            warn!("Shutdown already in progress");
            return false;
        }
        *state = ShutdownState::ShuttingDown;
        drop(state);

        info!("Initiating graceful shutdown");
        // No receivers is fine: pollers read the state instead
        let _ = self.shutdown_tx.send(());
        true
    }

    /// Raise the signal, give in-flight work the grace period, then mark done
    pub async fn shutdown(&self) {
        if !self.trigger().await {
            return;
        }

        tokio::time::sleep(self.grace_period).await;
        self.mark_complete().await;
    }

    /// Record that every component has stopped
    pub async fn mark_complete(&self) {
        *self.state.write().await = ShutdownState::Shutdown;
        info!("Shutdown complete");
    }

    /// Check if shutdown is in progress
    pub async fn is_shutting_down(&self) -> bool {
        *self.state.read().await != ShutdownState::Running
    }

    /// Get current state
    pub async fn state(&self) -> ShutdownState {
        *self.state.read().await
    }

    /// Resolve once the shutdown signal has been raised, even if that
    /// happened before this call
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe();
        if self.is_shutting_down().await {
            return;
        }
        let _ = rx.recv().await;
    }
}

/// Install SIGINT / SIGTERM handlers that trigger the coordinator
#[cfg(unix)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        coordinator.trigger().await;
    });

    Ok(())
}

/// Install a Ctrl+C handler that triggers the coordinator
#[cfg(windows)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) -> std::io::Result<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C");
                coordinator.trigger().await;
            }
            Err(e) => warn!(error = %e, "Ctrl+C handler failed"),
        }
    });
    Ok(())
}
