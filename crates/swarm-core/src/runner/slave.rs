use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::RunnerState;
use crate::config::RunnerConfig;
use crate::cpu::CpuSampler;
use crate::events::{EventBus, Payload, TOPIC_REPORT_TO_MASTER, TOPIC_SPAWN, TOPIC_STOP};
use crate::facade::Output;
use crate::master::{MasterClient, WireMessage};
use crate::pool::{HatchPlan, WorkerPool};
use crate::ratelimiter::RateLimiter;
use crate::stats::{Control, Report, StatsAggregator, StatsHandle};
use crate::tasks::TaskSet;

const MISSED_HEARTBEAT_LIMIT: u32 = 3;

fn state_label(state: RunnerState) -> &'static str {
    match state {
        RunnerState::Ready => "ready",
        RunnerState::Spawning => "spawning",
        RunnerState::Running => "running",
        RunnerState::Stopped => "stopped",
        RunnerState::Missing => "missing",
    }
}

/// A master-driven state machine: `ready -> spawning -> running -> stopped`,
/// with `missing` entered from any state after too many missed heartbeats,
/// and `quit` reachable from any state.
pub struct SlaveRunner {
    pool: WorkerPool,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    stats: StatsHandle,
    events: Arc<EventBus>,
    outputs: Vec<Arc<dyn Output>>,
    master: Arc<MasterClient>,
    node_id: String,
    config: RunnerConfig,
    state: Mutex<RunnerState>,
    report_rx: Mutex<Option<mpsc::Receiver<Arc<Report>>>>,
    quit_requested: Notify,
    quit_flag: AtomicBool,
    quit_done: Notify,
    run_loop: Mutex<Option<JoinHandle<()>>>,
}

impl SlaveRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_set: Arc<TaskSet>,
        rate_limiter: Option<Arc<dyn RateLimiter>>,
        config: RunnerConfig,
        events: Arc<EventBus>,
        outputs: Vec<Arc<dyn Output>>,
        master: Arc<MasterClient>,
        node_id: String,
    ) -> Self {
        let user_count = Arc::new(AtomicU32::new(0));
        let (stats, report_rx, _stats_join) =
            StatsAggregator::spawn(config.report_interval, user_count.clone());
        let pool = WorkerPool::new(task_set, rate_limiter.clone(), stats.clone(), user_count);

        Self {
            pool,
            rate_limiter,
            stats,
            events,
            outputs,
            master,
            node_id,
            config,
            state: Mutex::new(RunnerState::Ready),
            report_rx: Mutex::new(Some(report_rx)),
            quit_requested: Notify::new(),
            quit_flag: AtomicBool::new(false),
            quit_done: Notify::new(),
            run_loop: Mutex::new(None),
        }
    }

    pub fn stats(&self) -> StatsHandle {
        self.stats.clone()
    }

    pub async fn state(&self) -> RunnerState {
        *self.state.lock().await
    }

    async fn set_state(&self, next: RunnerState) {
        *self.state.lock().await = next;
    }

    /// Spawns the state machine's run loop. Consumes `self: Arc<Self>` so
    /// the loop can hold its own reference without unsafe lifetime tricks.
    pub fn spawn_run_loop(self: Arc<Self>) {
        let runner = self.clone();
        let handle = tokio::spawn(async move { runner.run_loop().await });
        // spawn_run_loop is only ever called once per runner, right after
        // construction, so the lock is uncontended.
        if let Ok(mut slot) = self.run_loop.try_lock() {
            *slot = Some(handle);
        }
    }

    async fn run_loop(self: Arc<Self>) {
        let report_rx = self.report_rx.lock().await.take();
        let Some(mut report_rx) = report_rx else {
            warn!("slave run loop started twice, exiting");
            return;
        };

        self.send(WireMessage::new(
            "client_ready",
            json!({}),
            self.node_id.clone(),
        ))
        .await;

        let mut cpu = CpuSampler::new();
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_period);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut missed_heartbeats = 0u32;

        loop {
            tokio::select! {
                _ = self.quit_requested.notified() => {
                    self.handle_quit().await;
                    break;
                }
                _ = heartbeat.tick() => {
                    let state = self.state().await;
                    self.send(WireMessage::new(
                        "heartbeat",
                        json!({"state": state_label(state), "cpu": cpu.sample()}),
                        self.node_id.clone(),
                    ))
                    .await;

                    if self.master.is_disconnected() {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= MISSED_HEARTBEAT_LIMIT {
                            self.enter_missing().await;
                            missed_heartbeats = 0;
                        }
                    } else {
                        missed_heartbeats = 0;
                    }
                }
                msg = self.master.recv() => {
                    match msg {
                        Some(msg) => {
                            missed_heartbeats = 0;
                            if self.handle_inbound(msg).await {
                                break;
                            }
                        }
                        None => {
                            // A closed inbound channel means `recv()` never
                            // blocks again; pace retries to the heartbeat
                            // cadence instead of spinning the loop.
                            self.enter_missing().await;
                            tokio::time::sleep(self.config.heartbeat_period).await;
                        }
                    }
                }
                report = report_rx.recv() => {
                    if let Some(report) = report {
                        for output in &self.outputs {
                            output.on_event(report.clone()).await;
                        }
                        self.events
                            .publish(TOPIC_REPORT_TO_MASTER, Payload::Report(report.clone()));
                        // Never sent before client_ready (already sent above)
                        // nor after quit (loop has already broken by then).
                        self.send(WireMessage::new(
                            "stats",
                            serde_json::to_value(&*report).unwrap_or(json!({})),
                            self.node_id.clone(),
                        ))
                        .await;
                    }
                }
            }
        }

        debug!("slave run loop stopped");
        self.quit_done.notify_waiters();
    }

    async fn handle_inbound(&self, msg: WireMessage) -> bool {
        match msg.msg_type.as_str() {
            "spawn" => {
                let user_count = msg
                    .data
                    .get("user_count")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32;
                let spawn_rate = msg
                    .data
                    .get("spawn_rate")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32;

                self.set_state(RunnerState::Spawning).await;
                self.events.publish(TOPIC_SPAWN, Payload::UserCount(user_count));
                if let Some(limiter) = &self.rate_limiter {
                    limiter.clone().start();
                }
                self.pool.resize(user_count, HatchPlan::smooth(spawn_rate)).await;
                self.set_state(RunnerState::Running).await;
                self.send(WireMessage::new(
                    "spawning_complete",
                    json!({"user_count": user_count}),
                    self.node_id.clone(),
                ))
                .await;
                false
            }
            "stop" => {
                self.pool.stop().await;
                self.set_state(RunnerState::Stopped).await;
                self.events.publish(TOPIC_STOP, Payload::None);
                self.send(WireMessage::new("client_stopped", json!({}), self.node_id.clone()))
                    .await;
                false
            }
            "quit" => {
                self.handle_quit().await;
                true
            }
            "reconnect" | "ack" => false,
            other => {
                debug!(msg_type = %other, "ignoring unrecognized inbound message");
                false
            }
        }
    }

    async fn handle_quit(&self) {
        self.pool.stop().await;
        self.stats.control(Control::Stop).await;
        if let Some(limiter) = &self.rate_limiter {
            limiter.stop().await;
        }
        self.send(WireMessage::new("quit", json!({}), self.node_id.clone()))
            .await;
    }

    async fn enter_missing(&self) {
        self.set_state(RunnerState::Missing).await;
        self.send(WireMessage::new(
            "client_ready",
            json!({}),
            self.node_id.clone(),
        ))
        .await;
    }

    async fn send(&self, msg: WireMessage) {
        self.master.send(msg).await;
    }

    /// Externally-triggered quit (SIGINT/SIGTERM via the facade), distinct
    /// from a `quit` message arriving from the master. Idempotent.
    pub async fn quit(&self) {
        if self.quit_flag.swap(true, Ordering::SeqCst) {
            return;
        }
        self.quit_requested.notify_one();
        self.quit_done.notified().await;
    }
}
