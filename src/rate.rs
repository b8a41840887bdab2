//! Rate-limiting wrappers: trailing-edge debounce and leading-edge throttle.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Handler invoked with the most recent debounced value.
pub type DebounceHandler<T> =
    Arc<dyn Fn(T) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Trailing-edge debouncer.
///
/// Every `call` restarts the quiet-period timer; once `delay` elapses
/// with no newer call, the handler runs once with the latest value.
/// A value still pending when the debouncer shuts down is delivered
/// before the task exits.
pub struct Debouncer<T> {
    tx: Option<mpsc::UnboundedSender<T>>,
    is_running: Arc<AtomicBool>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(delay: Duration, handler: DebounceHandler<T>) -> Self {
        // Unbounded so a burst can never drop its newest value; the drain
        // task keeps only one pending value at a time anyway
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        let is_running = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&is_running);

        tokio::spawn(async move {
            let mut pending: Option<T> = None;

            loop {
                match pending.take() {
                    None => match rx.recv().await {
                        Some(value) => pending = Some(value),
                        None => break,
                    },
                    Some(current) => match timeout(delay, rx.recv()).await {
                        // A newer call restarts the quiet period
                        Ok(Some(value)) => pending = Some(value),
                        // Channel closed: deliver what is pending, then exit
                        Ok(None) => {
                            handler(current).await;
                            break;
                        }
                        // Quiet period elapsed
                        Err(_) => {
                            handler(current).await;
                        }
                    },
                }
            }

            running.store(false, Ordering::SeqCst);
        });

        Self {
            tx: Some(tx),
            is_running,
        }
    }

    /// Record a call. Returns false if the debouncer has been stopped.
    pub fn call(&self, value: T) -> bool {
        match self.tx {
            Some(ref tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Shut down, delivering any pending value first.
    pub fn stop(&mut self) {
        self.tx = None;
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

/// Leading-edge throttle: allows at most one acquisition per window.
///
/// Calls arriving inside an open window are dropped, not deferred.
pub struct Throttle {
    window: Duration,
    last_fired: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: Mutex::new(None),
        }
    }

    /// Try to pass the throttle. Returns true at most once per window.
    pub fn acquire(&self) -> bool {
        let mut last_fired = self.last_fired.lock();
        let now = Instant::now();

        let allowed = match *last_fired {
            Some(fired_at) => now.duration_since(fired_at) >= self.window,
            None => true,
        };

        if allowed {
            *last_fired = Some(now);
        }
        allowed
    }

    /// Run `f` if the throttle allows it, returning its output.
    pub fn run<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce() -> T,
    {
        if self.acquire() {
            Some(f())
        } else {
            None
        }
    }

    /// Time left until the throttle opens again.
    pub fn remaining(&self) -> Duration {
        let last_fired = self.last_fired.lock();
        match *last_fired {
            Some(fired_at) => self.window.saturating_sub(fired_at.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Forget the last acquisition; the next `acquire` will pass.
    pub fn reset(&self) {
        *self.last_fired.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_rapid_calls_collapse_to_last() {
        let invocations = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(PlMutex::new(Vec::new()));

        let inv = Arc::clone(&invocations);
        let seen_clone = Arc::clone(&seen);
        let handler: DebounceHandler<u32> = Arc::new(move |value| {
            let inv = Arc::clone(&inv);
            let seen = Arc::clone(&seen_clone);
            Box::pin(async move {
                inv.fetch_add(1, Ordering::SeqCst);
                seen.lock().push(value);
            })
        });

        let debouncer = Debouncer::new(Duration::from_millis(50), handler);

        for i in 1..=5 {
            assert!(debouncer.call(i));
        }

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec![5]);
    }

    #[tokio::test]
    async fn test_separated_calls_each_fire() {
        let invocations = Arc::new(AtomicU32::new(0));

        let inv = Arc::clone(&invocations);
        let handler: DebounceHandler<u32> = Arc::new(move |_| {
            let inv = Arc::clone(&inv);
            Box::pin(async move {
                inv.fetch_add(1, Ordering::SeqCst);
            })
        });

        let debouncer = Debouncer::new(Duration::from_millis(20), handler);

        debouncer.call(1);
        tokio::time::sleep(Duration::from_millis(60)).await;
        debouncer.call(2);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stop_delivers_pending_value() {
        let seen = Arc::new(PlMutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let handler: DebounceHandler<u32> = Arc::new(move |value| {
            let seen = Arc::clone(&seen_clone);
            Box::pin(async move {
                seen.lock().push(value);
            })
        });

        let mut debouncer = Debouncer::new(Duration::from_secs(60), handler);

        debouncer.call(7);
        tokio::time::sleep(Duration::from_millis(20)).await;
        debouncer.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*seen.lock(), vec![7]);
        assert!(!debouncer.is_running());
        assert!(!debouncer.call(8));
    }

    #[test]
    fn test_throttle_allows_first_call() {
        let throttle = Throttle::new(Duration::from_secs(60));

        assert!(throttle.acquire());
        assert!(!throttle.acquire());
    }

    #[test]
    fn test_throttle_run_suppresses_in_window() {
        let throttle = Throttle::new(Duration::from_secs(60));

        assert_eq!(throttle.run(|| 1), Some(1));
        assert_eq!(throttle.run(|| 2), None);
    }

    #[test]
    fn test_throttle_reopens_after_window() {
        let throttle = Throttle::new(Duration::from_millis(0));

        assert!(throttle.acquire());
        assert!(throttle.acquire());
    }

    #[test]
    fn test_throttle_remaining_and_reset() {
        let throttle = Throttle::new(Duration::from_secs(60));

        assert_eq!(throttle.remaining(), Duration::ZERO);
        throttle.acquire();
        assert!(throttle.remaining() > Duration::ZERO);

        throttle.reset();
        assert_eq!(throttle.remaining(), Duration::ZERO);
        assert!(throttle.acquire());
    }
}
