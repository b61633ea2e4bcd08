use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::RunnerState;
use crate::events::{EventBus, Payload, TOPIC_QUIT, TOPIC_SPAWN_COMPLETE, TOPIC_STOP};
use crate::facade::Output;
use crate::pool::{HatchPlan, WorkerPool};
use crate::ratelimiter::RateLimiter;
use crate::stats::{Control, Report, StatsAggregator, StatsHandle};
use crate::tasks::TaskSet;

/// Standalone lifecycle: spawn workers up to a target, run, and stop on
/// request.
pub struct LocalRunner {
    pool: WorkerPool,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    stats: StatsHandle,
    events: Arc<EventBus>,
    state: Mutex<RunnerState>,
    quit_called: AtomicBool,
    report_forward: Mutex<Option<JoinHandle<()>>>,
    stats_join: Mutex<Option<JoinHandle<()>>>,
}

impl LocalRunner {
    pub fn new(
        task_set: Arc<TaskSet>,
        rate_limiter: Option<Arc<dyn RateLimiter>>,
        report_interval: Duration,
        events: Arc<EventBus>,
        outputs: Vec<Arc<dyn Output>>,
    ) -> Self {
        let user_count = Arc::new(AtomicU32::new(0));
        let (stats, report_rx, stats_join) = StatsAggregator::spawn(report_interval, user_count.clone());
        let pool = WorkerPool::new(task_set, rate_limiter.clone(), stats.clone(), user_count);
        let report_forward = spawn_report_forwarder(report_rx, outputs);

        Self {
            pool,
            rate_limiter,
            stats,
            events,
            state: Mutex::new(RunnerState::Ready),
            quit_called: AtomicBool::new(false),
            report_forward: Mutex::new(Some(report_forward)),
            stats_join: Mutex::new(Some(stats_join)),
        }
    }

    pub fn stats(&self) -> StatsHandle {
        self.stats.clone()
    }

    pub async fn state(&self) -> RunnerState {
        *self.state.lock().await
    }

    pub async fn run(&self, target: u32, plan: HatchPlan) {
        *self.state.lock().await = RunnerState::Spawning;
        if let Some(limiter) = &self.rate_limiter {
            limiter.clone().start();
        }
        self.pool.resize(target, plan).await;
        *self.state.lock().await = RunnerState::Running;
        self.events
            .publish(TOPIC_SPAWN_COMPLETE, Payload::UserCount(target));
    }

    /// Idempotent: a second call is a no-op.
    pub async fn close(&self) {
        if self.quit_called.swap(true, Ordering::SeqCst) {
            return;
        }
        self.events.publish(TOPIC_QUIT, Payload::None);
        self.pool.stop().await;
        self.events.publish(TOPIC_STOP, Payload::None);
        self.stats.control(Control::Stop).await;
        if let Some(limiter) = &self.rate_limiter {
            limiter.stop().await;
        }
        *self.state.lock().await = RunnerState::Stopped;

        if let Some(handle) = self.report_forward.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.stats_join.lock().await.take() {
            let _ = handle.await;
        }
    }
}

fn spawn_report_forwarder(
    mut report_rx: mpsc::Receiver<Arc<Report>>,
    outputs: Vec<Arc<dyn Output>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        for output in &outputs {
            output.on_start().await;
        }
        while let Some(report) = report_rx.recv().await {
            for output in &outputs {
                output.on_event(report.clone()).await;
            }
        }
        for output in &outputs {
            output.on_stop().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TOPIC_SPAWN_COMPLETE as SPAWN_COMPLETE;
    use crate::tasks::Task;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn run_brings_pool_to_target_and_publishes_spawn_complete() {
        let mut task_set = TaskSet::new();
        task_set
            .add(Task::new("hello", 1, || async { Ok(()) }))
            .unwrap();

        let events = Arc::new(EventBus::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        events.subscribe(
            SPAWN_COMPLETE,
            Arc::new(move |_| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let runner = LocalRunner::new(
            Arc::new(task_set),
            None,
            Duration::from_secs(60),
            events,
            Vec::new(),
        );

        runner.run(3, HatchPlan::Asap).await;
        assert_eq!(runner.state().await, RunnerState::Running);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        runner.close().await;
        assert_eq!(runner.state().await, RunnerState::Stopped);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut task_set = TaskSet::new();
        task_set
            .add(Task::new("hello", 1, || async { Ok(()) }))
            .unwrap();
        let runner = LocalRunner::new(
            Arc::new(task_set),
            None,
            Duration::from_secs(60),
            Arc::new(EventBus::new()),
            Vec::new(),
        );
        runner.run(1, HatchPlan::Asap).await;
        runner.close().await;
        runner.close().await;
        assert_eq!(runner.state().await, RunnerState::Stopped);
    }
}
