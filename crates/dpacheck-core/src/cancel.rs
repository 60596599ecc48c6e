//! Run-wide cancellation.
//!
//! A [`CancelToken`] is a cloneable handle on a `watch` channel carrying a
//! single flag. Any clone may cancel; every clone observes it. Work that
//! suspends on I/O races its future against [`CancelToken::cancelled`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Set the flag. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // the sender lives as long as any clone of the token, including self
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// A raw receiver for components that only speak `watch`.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Cancel automatically once `deadline` has elapsed. Must be called
    /// from within a tokio runtime.
    pub fn cancel_after(&self, deadline: Duration) -> tokio::task::JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline) => token.cancel(),
                _ = token.cancelled() => {}
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled_and_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(*clone.subscribe().borrow());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_fires_at_deadline() {
        let token = CancelToken::new();
        token.cancel_after(Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(!token.is_cancelled());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(token.is_cancelled());
    }
}
