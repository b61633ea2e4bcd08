//! The worker pool: spawns and retires virtual users to track a target
//! concurrency level, and runs their task-execution loop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ratelimiter::{Admission, RateLimiter};
use crate::stats::StatsHandle;
use crate::tasks::TaskSet;

/// How newly-created workers should be brought online.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HatchPlan {
    /// Spawn every missing worker immediately.
    Asap,
    /// Spawn at a constant pace of `rate` workers per second.
    Smooth { rate: u32 },
}

impl HatchPlan {
    /// A `hatch_rate` of zero in smooth mode is treated as asap: the source
    /// this was distilled from handled it inconsistently, and asap is the
    /// more useful fallback for a misconfigured ramp.
    pub fn smooth(rate: u32) -> Self {
        if rate == 0 {
            HatchPlan::Asap
        } else {
            HatchPlan::Smooth { rate }
        }
    }
}

/// One active virtual user. Owned exclusively by the [`WorkerPool`]; nothing
/// outside the pool creates or cancels tickets.
struct WorkerTicket {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Spawns and retires workers to match a target concurrency level.
pub struct WorkerPool {
    tickets: Mutex<Vec<WorkerTicket>>,
    root_cancel: CancellationToken,
    task_set: Arc<TaskSet>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    stats: StatsHandle,
    user_count: Arc<AtomicU32>,
}

impl WorkerPool {
    pub fn new(
        task_set: Arc<TaskSet>,
        rate_limiter: Option<Arc<dyn RateLimiter>>,
        stats: StatsHandle,
        user_count: Arc<AtomicU32>,
    ) -> Self {
        Self {
            tickets: Mutex::new(Vec::new()),
            root_cancel: CancellationToken::new(),
            task_set,
            rate_limiter,
            stats,
            user_count,
        }
    }

    pub fn active_count(&self) -> usize {
        // try_lock is fine here: callers only use this for observability, and
        // contention is brief (resize holds the lock only while mutating).
        self.tickets.try_lock().map(|t| t.len()).unwrap_or(0)
    }

    /// Brings the pool to `target` active workers. Shrinking always happens
    /// immediately regardless of `plan` — only growth is paced.
    pub async fn resize(&self, target: u32, plan: HatchPlan) {
        let current = {
            let tickets = self.tickets.lock().await;
            tickets.len() as u32
        };

        if target < current {
            self.shrink_to(target).await;
            self.user_count.store(target, Ordering::Relaxed);
            return;
        }

        let to_add = target - current;
        if to_add == 0 {
            return;
        }

        match plan {
            HatchPlan::Asap => {
                for _ in 0..to_add {
                    self.spawn_one();
                }
            }
            HatchPlan::Smooth { rate } => {
                let mut ticker =
                    tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(rate)));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                for i in 0..to_add {
                    if i > 0 {
                        ticker.tick().await;
                    }
                    self.spawn_one();
                }
            }
        }
        self.user_count.store(target, Ordering::Relaxed);
    }

    async fn shrink_to(&self, target: u32) {
        let excess = {
            let mut tickets = self.tickets.lock().await;
            tickets.split_off(target as usize)
        };
        for ticket in excess {
            ticket.cancel.cancel();
            // Workers exit at their next loop head; detach rather than block
            // the caller waiting for in-flight task bodies to finish.
            ticket.handle.abort();
        }
    }

    fn spawn_one(&self) {
        let cancel = self.root_cancel.child_token();
        let task_set = self.task_set.clone();
        let rate_limiter = self.rate_limiter.clone();
        let stats = self.stats.clone();
        let worker_cancel = cancel.clone();
        let handle = tokio::spawn(run_worker(worker_cancel, task_set, rate_limiter, stats));

        if let Ok(mut tickets) = self.tickets.try_lock() {
            tickets.push(WorkerTicket { cancel, handle });
        }
    }

    /// Cancels every worker and waits for the pool to drain. Once this
    /// returns, no worker is executing a task body.
    pub async fn stop(&self) {
        self.root_cancel.cancel();
        let tickets = {
            let mut tickets = self.tickets.lock().await;
            std::mem::take(&mut *tickets)
        };
        for ticket in tickets {
            let _ = ticket.handle.await;
        }
        self.user_count.store(0, Ordering::Relaxed);
    }
}

async fn run_worker(
    cancel: CancellationToken,
    task_set: Arc<TaskSet>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    stats: StatsHandle,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        if let Some(limiter) = &rate_limiter {
            tokio::select! {
                _ = cancel.cancelled() => break,
                admission = limiter.acquire() => {
                    if admission == Admission::Closed {
                        debug!("rate limiter closed, worker exiting");
                        break;
                    }
                }
            }
        }

        let Some(task) = task_set.pick().cloned() else {
            break;
        };

        let start = Instant::now();
        // Run the task body on its own task so a panic there can be caught
        // and turned into a failure sample rather than killing this worker.
        let result = tokio::spawn(async move { task.run().await }).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if let Err(join_err) = result {
            if join_err.is_panic() {
                let message = panic_message(join_err);
                warn!(%message, "task panicked");
                // Endpoint identity for an auto-recorded panic failure: the
                // task name stands in for what would otherwise be the
                // request type/name the task itself would have reported.
                stats.record_failure("", "panic", elapsed_ms, message);
            }
        }
    }
}

fn panic_message(join_err: tokio::task::JoinError) -> String {
    let panic = join_err.into_panic();
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker task panicked".to_string()
    }
}
