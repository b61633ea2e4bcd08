//! The public API binding the runner, stats, rate limiter and event bus
//! together. Thin by design: the subsystems it orchestrates carry the real
//! logic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{HatchType, RunnerConfig};
use crate::events::{EventBus, Payload, TOPIC_QUIT};
use crate::master::{generate_node_id, MasterClient, TcpTransport};
use crate::ratelimiter::RateLimiter;
use crate::runner::{LocalRunner, SlaveRunner};
use crate::stats::{Report, StatsHandle};
use crate::tasks::TaskSet;
use crate::SwarmError;

/// How the facade's `Quit` waits for a distributed shutdown to be confirmed
/// before giving up and returning anyway.
const QUIT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Standalone,
    Distributed,
}

/// A sink for aggregated reports, notified across a run's lifecycle.
#[async_trait]
pub trait Output: Send + Sync {
    async fn on_start(&self) {}
    async fn on_event(&self, report: Arc<Report>);
    async fn on_stop(&self) {}
}

enum ActiveRunner {
    Local(Arc<LocalRunner>),
    Slave(Arc<SlaveRunner>),
}

/// Public facade over a runner instance. Usable standalone — the global
/// singleton in [`global`] is a convenience, not a requirement.
pub struct Boomer {
    mode: Mutex<Mode>,
    config: Mutex<RunnerConfig>,
    rate_limiter: Mutex<Option<Arc<dyn RateLimiter>>>,
    outputs: Mutex<Vec<Arc<dyn Output>>>,
    events: Arc<EventBus>,
    active: Mutex<Option<ActiveRunner>>,
    stats: Mutex<Option<StatsHandle>>,
    quit_called: AtomicBool,
}

impl Boomer {
    pub fn new(config: RunnerConfig) -> Arc<Self> {
        let mode = if config.is_distributed() {
            Mode::Distributed
        } else {
            Mode::Standalone
        };
        Arc::new(Self {
            mode: Mutex::new(mode),
            config: Mutex::new(config),
            rate_limiter: Mutex::new(None),
            outputs: Mutex::new(Vec::new()),
            events: Arc::new(EventBus::new()),
            active: Mutex::new(None),
            stats: Mutex::new(None),
            quit_called: AtomicBool::new(false),
        })
    }

    pub fn standalone(config: RunnerConfig) -> Arc<Self> {
        Self::new(RunnerConfig {
            master_host: None,
            ..config
        })
    }

    pub fn distributed(config: RunnerConfig) -> Arc<Self> {
        Self::new(config)
    }

    pub async fn set_rate_limiter(&self, limiter: Arc<dyn RateLimiter>) {
        *self.rate_limiter.lock().await = Some(limiter);
    }

    /// Accepts only `"asap"` or `"smooth"`; anything else is logged and
    /// ignored, leaving the previous hatch type in place.
    pub async fn set_hatch_type(&self, hatch_type: &str) {
        match hatch_type.parse::<HatchType>() {
            Ok(parsed) => self.config.lock().await.hatch_type = parsed,
            Err(e) => warn!(%e, "ignoring invalid hatch-type"),
        }
    }

    pub async fn set_mode(&self, mode: Mode) {
        *self.mode.lock().await = mode;
    }

    pub async fn add_output(&self, output: Arc<dyn Output>) {
        self.outputs.lock().await.push(output);
    }

    /// Validates configuration, then starts either a local or slave runner
    /// depending on the current mode. If `run-tasks` is configured, runs
    /// each named task once and returns without starting a pool.
    pub async fn run(&self, task_set: TaskSet) -> Result<(), SwarmError> {
        let config = self.config.lock().await.clone();
        config.validate()?;

        if !config.run_tasks.is_empty() {
            for name in &config.run_tasks {
                match task_set.find(name) {
                    Some(task) => {
                        info!(task = %name, "running one-shot task");
                        if let Err(e) = task.run().await {
                            warn!(task = %name, error = %e, "one-shot task failed");
                        }
                    }
                    None => warn!(task = %name, "run-tasks named an unknown task"),
                }
            }
            return Ok(());
        }

        let task_set = Arc::new(task_set);
        let mode = *self.mode.lock().await;
        let rate_limiter = self.rate_limiter.lock().await.clone();
        let outputs = self.outputs.lock().await.clone();

        match mode {
            Mode::Standalone => {
                let runner = Arc::new(LocalRunner::new(
                    task_set,
                    rate_limiter,
                    config.report_interval,
                    self.events.clone(),
                    outputs,
                ));
                *self.stats.lock().await = Some(runner.stats());
                runner.run(config.hatch_count, config.hatch_plan()).await;
                *self.active.lock().await = Some(ActiveRunner::Local(runner));
            }
            Mode::Distributed => {
                let host = config
                    .master_host
                    .clone()
                    .ok_or_else(|| SwarmError::Validation("master-host is required in distributed mode".into()))?;
                let transport = TcpTransport::connect(&host, config.master_port).await?;
                let master = Arc::new(MasterClient::spawn(Box::new(transport)));
                let node_id = generate_node_id();
                let runner = Arc::new(SlaveRunner::new(
                    task_set,
                    rate_limiter,
                    config.clone(),
                    self.events.clone(),
                    outputs,
                    master,
                    node_id,
                ));
                *self.stats.lock().await = Some(runner.stats());
                runner.clone().spawn_run_loop();
                *self.active.lock().await = Some(ActiveRunner::Slave(runner));
            }
        }
        Ok(())
    }

    /// Publishes `boomer:quit` and stops whichever runner is active. Waits
    /// at most three seconds for a distributed shutdown to confirm.
    /// Calling this twice is equivalent to calling it once.
    pub async fn quit(&self) {
        if self.quit_called.swap(true, Ordering::SeqCst) {
            return;
        }
        self.events.publish(TOPIC_QUIT, Payload::None);

        let active = self.active.lock().await.take();
        match active {
            Some(ActiveRunner::Local(runner)) => runner.close().await,
            Some(ActiveRunner::Slave(runner)) => {
                let _ = tokio::time::timeout(QUIT_TIMEOUT, runner.quit()).await;
            }
            None => {}
        }
    }

    /// No-ops silently if no runner has been started yet.
    pub async fn record_success(
        &self,
        request_type: impl Into<String>,
        name: impl Into<String>,
        response_time_ms: u64,
        response_length: u64,
    ) {
        if let Some(stats) = &*self.stats.lock().await {
            stats.record_success(request_type, name, response_time_ms, response_length);
        }
    }

    pub async fn record_failure(
        &self,
        request_type: impl Into<String>,
        name: impl Into<String>,
        response_time_ms: u64,
        error: impl Into<String>,
    ) {
        if let Some(stats) = &*self.stats.lock().await {
            stats.record_failure(request_type, name, response_time_ms, error);
        }
    }
}

/// A process-wide singleton, kept as a convenience only: every operation
/// above is equally usable on an owned [`Boomer`] instance.
static DEFAULT_BOOMER: OnceLock<Arc<Boomer>> = OnceLock::new();

pub fn init_global(config: RunnerConfig) -> Arc<Boomer> {
    DEFAULT_BOOMER.get_or_init(|| Boomer::new(config)).clone()
}

pub fn global() -> Option<Arc<Boomer>> {
    DEFAULT_BOOMER.get().cloned()
}
