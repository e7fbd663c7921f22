//! Shutdown signalling.
//!
//! A `watch::channel(false)` is created per process; Ctrl-C flips it to
//! `true` and every listener stops once it observes the change.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Fresh shutdown channel, initially not signalled.
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolve once shutdown is signalled or the sender is gone.
pub async fn signalled(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

/// Signal `shutdown` on Ctrl-C.
pub fn on_ctrl_c(shutdown: watch::Sender<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        let _ = shutdown.send(true);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_signalled_pending_until_sent() {
        let (tx, rx) = channel();
        let mut waiter = tokio_test::task::spawn(signalled(rx));

        tokio_test::assert_pending!(waiter.poll());
        tx.send(true).unwrap();

        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_signalled_resolves_on_send() {
        let (tx, rx) = channel();
        let waiter = tokio::spawn(signalled(rx));

        tx.send(true).unwrap();

        timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_signalled_resolves_when_sender_dropped() {
        let (tx, rx) = channel();
        drop(tx);

        timeout(Duration::from_secs(1), signalled(rx)).await.unwrap();
    }

    #[tokio::test]
    async fn test_already_signalled() {
        let (tx, rx) = channel();
        tx.send(true).unwrap();

        timeout(Duration::from_secs(1), signalled(rx)).await.unwrap();
    }
}
