// Broker Shutdown Token

use std::sync::Arc;
use tokio::sync::watch;

/// Shutdown signal shared by every consumer
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal
    ///
    /// Returns immediately if shutdown was already requested or the sender is gone.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Shutdown sender
#[derive(Clone)]
pub struct ShutdownSender {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSender {
    /// Signal shutdown to all consumers
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx: Arc::new(tx) }, ShutdownToken { rx })
}
