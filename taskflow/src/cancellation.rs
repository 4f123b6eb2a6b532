//! Cancellation signal shared by the worker pool and running handlers.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Broadcast cancellation for worker loops and in-flight handlers.
///
/// Loops check it before claiming the next job; handlers receive a clone and
/// may race their own I/O against [`cancelled`](Self::cancelled) to abort
/// early.
///
/// # Examples
///
/// ```rust
/// use taskflow::cancellation::CancellationToken;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let token = CancellationToken::new();
///
///     let worker = token.clone();
///     let handle = tokio::spawn(async move {
///         worker
///             .run_until_cancelled(tokio::time::sleep(Duration::from_secs(60)))
///             .await
///     });
///
///     token.cancel();
///     assert!(handle.await.unwrap().is_none());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Create a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Signal every clone of this token. Calling it again is a no-op.
    pub fn cancel(&self) {
        let changed = self.tx.send_if_modified(|cancelled| {
            let was = *cancelled;
            *cancelled = true;
            !was
        });
        if changed {
            debug!("cancellation requested");
        }
    }

    /// Resolve once cancellation has been requested.
    ///
    /// Returns immediately if already cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any clone, so this only errors on teardown.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Drive `future` until it finishes or the token is cancelled.
    ///
    /// Returns `None` if cancellation won.
    pub async fn run_until_cancelled<F>(&self, future: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            () = self.cancelled() => None,
            output = future => Some(output),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancellation_token_new() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_reaches_clones() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        token1.cancel();
        token1.cancel();
        assert!(token2.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let token = CancellationToken::new();

        let token_clone = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token_clone.cancel();
        });

        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("already cancelled token should resolve at once");
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let token = CancellationToken::new();

        let token_clone = token.clone();
        let result = tokio::spawn(async move {
            token_clone
                .run_until_cancelled(async {
                    tokio::time::sleep(Duration::from_secs(1000)).await;
                    42
                })
                .await
        });

        token.cancel();
        assert_eq!(result.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_run_until_cancelled_completes() {
        let token = CancellationToken::new();
        assert_eq!(token.run_until_cancelled(async { 7 }).await, Some(7));
    }
}
