use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// How a [`CloseSignal::wait_timeout`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Fired,
    Elapsed,
}

/// A broadcast that fires at most once.
///
/// Clones share the same signal. Waiters that start after the signal fired
/// return immediately.
#[derive(Debug, Clone)]
pub struct CloseSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CloseSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal fires.
    pub async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives as long as `self`, so this only returns once fired
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// Wait until the signal fires or `timeout` elapses, whichever is first.
    pub async fn wait_timeout(&self, timeout: Duration) -> Wake {
        match tokio::time::timeout(timeout, self.fired()).await {
            Ok(()) => Wake::Fired,
            Err(_) => Wake::Elapsed,
        }
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_at_most_once() {
        let signal = CloseSignal::new();
        let clone = signal.clone();
        assert!(!signal.is_fired());
        assert!(clone.fire());
        assert!(!signal.fire());
        assert!(!clone.fire());
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn test_waiters_are_released() {
        let signal = CloseSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.fired().await })
        };
        tokio::task::yield_now().await;
        signal.fire();
        waiter.await.unwrap();

        // a late waiter returns immediately
        signal.fired().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout() {
        let signal = CloseSignal::new();
        assert_eq!(
            signal.wait_timeout(Duration::from_secs(3)).await,
            Wake::Elapsed
        );

        signal.fire();
        assert_eq!(signal.wait_timeout(Duration::from_secs(3)).await, Wake::Fired);
    }
}
