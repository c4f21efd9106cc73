use std::sync::Arc;
use tokio::sync::watch;

/// One-shot readiness flag with any number of waiters.
///
/// Used both for the DNS-proxy gate and for "tunnel connected", which drives
/// the service-manager notification and the pidfile.
#[derive(Debug, Clone)]
pub struct ReadinessSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ReadinessSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// A signal that has already fired, for gates with no dependency.
    pub fn ready() -> Self {
        let signal = Self::new();
        signal.notify();
        signal
    }

    /// Fire the signal. Only the first call returns `true`.
    pub fn notify(&self) -> bool {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal fires; returns immediately if it already has.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once() {
        let signal = ReadinessSignal::new();
        assert!(!signal.is_ready());
        assert!(signal.notify());
        assert!(!signal.notify());
        assert!(signal.clone().is_ready());
    }

    #[tokio::test]
    async fn test_concurrent_notifiers_one_winner() {
        let signal = ReadinessSignal::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let signal = signal.clone();
            handles.push(tokio::spawn(async move { signal.notify() }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_waiters_released() {
        let signal = ReadinessSignal::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let signal = signal.clone();
                tokio::spawn(async move { signal.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        signal.notify();

        for waiter in waiters {
            waiter.await.unwrap();
        }
        // Late waiter returns immediately.
        signal.wait().await;
    }

    #[tokio::test]
    async fn test_ready_constructor() {
        let gate = ReadinessSignal::ready();
        assert!(gate.is_ready());
        gate.wait().await;
    }
}
