use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use super::{Admission, RateLimiter, DEFAULT_REFILL_PERIOD};

/// A fixed-rate token bucket: refilled to `max_tokens` every `refill_period`.
pub struct StableBucket {
    max_tokens: u64,
    refill_period: Duration,
    current: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StableBucket {
    pub fn new(max_tokens: u64) -> Arc<Self> {
        Self::with_refill_period(max_tokens, DEFAULT_REFILL_PERIOD)
    }

    pub fn with_refill_period(max_tokens: u64, refill_period: Duration) -> Arc<Self> {
        Arc::new(Self {
            max_tokens,
            refill_period,
            current: AtomicU64::new(max_tokens),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
            task: Mutex::new(None),
        })
    }
}

#[async_trait]
impl RateLimiter for StableBucket {
    fn start(self: Arc<Self>) {
        let bucket = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(bucket.refill_period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if bucket.closed.load(Ordering::Relaxed) {
                    break;
                }
                bucket.current.store(bucket.max_tokens, Ordering::Relaxed);
                bucket.notify.notify_waiters();
            }
        });
        // start() may be called more than once in tests; keep only the latest handle.
        if let Ok(mut slot) = self.task.try_lock() {
            *slot = Some(handle);
        }
    }

    async fn acquire(&self) -> Admission {
        loop {
            if self.closed.load(Ordering::Relaxed) {
                return Admission::Closed;
            }
            let mut current = self.current.load(Ordering::Relaxed);
            loop {
                if current == 0 {
                    break;
                }
                match self.current.compare_exchange_weak(
                    current,
                    current - 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return Admission::Open,
                    Err(observed) => current = observed,
                }
            }
            let notified = self.notify.notified();
            if self.closed.load(Ordering::Relaxed) {
                return Admission::Closed;
            }
            notified.await;
        }
    }

    async fn stop(&self) {
        self.closed.store(true, Ordering::Relaxed);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_drains_initial_tokens_without_blocking() {
        let bucket = StableBucket::new(3);
        assert_eq!(bucket.acquire().await, Admission::Open);
        assert_eq!(bucket.acquire().await, Admission::Open);
        assert_eq!(bucket.acquire().await, Admission::Open);
    }

    #[tokio::test]
    async fn stop_makes_acquire_return_closed() {
        let bucket = StableBucket::new(1);
        bucket.clone().start();
        bucket.acquire().await;
        bucket.stop().await;
        assert_eq!(bucket.acquire().await, Admission::Closed);
    }

    #[tokio::test]
    async fn refill_restores_tokens_up_to_max() {
        let bucket = StableBucket::with_refill_period(2, Duration::from_millis(20));
        bucket.clone().start();

        bucket.acquire().await;
        bucket.acquire().await;
        assert_eq!(bucket.current.load(Ordering::Relaxed), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(bucket.current.load(Ordering::Relaxed), 2);

        bucket.stop().await;
    }

    #[tokio::test]
    async fn admits_at_most_max_tokens_per_period_plus_burst() {
        // max_tokens = 5; over a window spanning just over two refill
        // periods, no more than 5 * 2 + 5 tokens can ever be available.
        let bucket = StableBucket::with_refill_period(5, Duration::from_millis(20));
        bucket.clone().start();

        let mut admitted = 0;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(45);
        while tokio::time::Instant::now() < deadline {
            if bucket.acquire().await == Admission::Open {
                admitted += 1;
            }
        }
        assert!(admitted <= 5 * 2 + 5);
        bucket.stop().await;
    }
}
