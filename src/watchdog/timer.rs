use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A one-shot delay that runs a callback on its own task unless cancelled first.
///
/// Cancelling after the timer fired has no effect on the running callback;
/// callers that need to detect this race must check their own state inside the
/// callback.
#[derive(Debug)]
pub struct RestartTimer {
    cancel: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl RestartTimer {
    /// Starts the timer. `on_fire` is awaited on the timer's task once `delay`
    /// has elapsed.
    pub fn start<F, Fut>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let fired = Arc::new(AtomicBool::new(false));

        tokio::spawn({
            let cancel = cancel.clone();
            let fired = Arc::clone(&fired);
            async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        fired.store(true, Ordering::SeqCst);
                        on_fire().await;
                    }
                }
            }
        });

        Self { cancel, fired }
    }

    /// Cancels the timer. Returns `true` if it had not fired yet.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel();
        !self.fired.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let calls = Arc::new(AtomicUsize::new(0));
        let timer = RestartTimer::start(Duration::from_secs(30), {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!timer.has_fired());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(timer.has_fired());
        assert!(!timer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let calls = Arc::new(AtomicUsize::new(0));
        let timer = RestartTimer::start(Duration::from_secs(30), {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(timer.cancel());
        assert!(timer.is_cancelled());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!timer.has_fired());
    }
}
