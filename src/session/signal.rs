//! Level-triggered wake-up flag for the acquisition loop.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A flag that tasks can wait on.
///
/// Once [`set`](ModeSignal::set), every current and future [`wait`](ModeSignal::wait) returns
/// immediately until someone calls [`clear`](ModeSignal::clear). Unlike a bare [`Notify`], a
/// `set` that happens while nobody is waiting is not lost.
#[derive(Debug, Default)]
pub struct ModeSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl ModeSignal {
    /// Lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter.
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Lower the flag.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Whether the flag is raised.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Wait until the flag is raised.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent `set` cannot slip in between.
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_wait_returns_when_already_set() {
        let signal = ModeSignal::new();
        signal.set();
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .unwrap();
        assert!(signal.is_set());
        signal.clear();
        assert!(!signal.is_set());
    }

    #[tokio::test]
    async fn test_set_wakes_every_waiter() {
        let signal = Arc::new(ModeSignal::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let signal = Arc::clone(&signal);
                tokio::spawn(async move { signal.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.set();
        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_cleared_signal_blocks() {
        let signal = ModeSignal::new();
        signal.set();
        signal.clear();
        let waited = tokio::time::timeout(Duration::from_millis(50), signal.wait()).await;
        assert!(waited.is_err());
    }
}
