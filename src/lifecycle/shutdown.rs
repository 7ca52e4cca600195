//! Shutdown coordination.

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that the server and the liveness monitor
/// subscribe to.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber. Subscribing after this misses the signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of subscribers that have not dropped their receiver yet.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Wait for Ctrl+C, then trigger.
    pub async fn trigger_on_ctrl_c(&self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Ctrl+C received, shutting down"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
        }
        self.trigger();
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
