use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use super::{Admission, RateLimiter};

struct State {
    current: u64,
    active_max: u64,
}

/// A token bucket whose active ceiling ramps linearly from zero up to
/// `target_max`, increasing by `step_tokens` every `step_period` until it
/// reaches the target. Refill always tops up to the *active* max, not the
/// target.
///
/// **Invariant:** `0 <= current <= active_max <= target_max` at all times.
pub struct RampedBucket {
    target_max: u64,
    step_tokens: u64,
    step_period: Duration,
    refill_period: Duration,
    state: Mutex<State>,
    closed: AtomicBool,
    notify: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RampedBucket {
    pub fn new(
        target_max: u64,
        step_tokens: u64,
        step_period: Duration,
        refill_period: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            target_max,
            step_tokens,
            step_period,
            refill_period,
            state: Mutex::new(State {
                current: 0,
                active_max: 0,
            }),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
            task: Mutex::new(None),
        })
    }

    /// Currently active ceiling. Exposed for the monotonicity test.
    pub async fn active_max(&self) -> u64 {
        self.state.lock().await.active_max
    }
}

#[async_trait]
impl RateLimiter for RampedBucket {
    fn start(self: Arc<Self>) {
        let bucket = self.clone();
        let handle = tokio::spawn(async move {
            let mut refill_ticker = tokio::time::interval(bucket.refill_period);
            refill_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut step_ticker = tokio::time::interval(bucket.step_period);
            step_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = refill_ticker.tick() => {
                        if bucket.closed.load(Ordering::Relaxed) {
                            break;
                        }
                        let mut state = bucket.state.lock().await;
                        state.current = state.active_max;
                        drop(state);
                        bucket.notify.notify_waiters();
                    }
                    _ = step_ticker.tick() => {
                        if bucket.closed.load(Ordering::Relaxed) {
                            break;
                        }
                        let mut state = bucket.state.lock().await;
                        state.active_max =
                            (state.active_max + bucket.step_tokens).min(bucket.target_max);
                        drop(state);
                    }
                }
            }
        });
        if let Ok(mut slot) = self.task.try_lock() {
            *slot = Some(handle);
        }
    }

    async fn acquire(&self) -> Admission {
        loop {
            if self.closed.load(Ordering::Relaxed) {
                return Admission::Closed;
            }
            {
                let mut state = self.state.lock().await;
                if state.current > 0 {
                    state.current -= 1;
                    return Admission::Open;
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
