use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::accumulator::EndpointAccumulator;
use super::report::{build_report, Control, Report};
use super::sample::{EndpointKey, Sample};

const INGRESS_CAPACITY: usize = 1024;
const CONTROL_CAPACITY: usize = 16;
const REPORT_CAPACITY: usize = 16;

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(3);

/// Producer-side entry point into the aggregator: senders for samples and
/// control messages, plus a running count of samples dropped under
/// backpressure.
#[derive(Clone)]
pub struct StatsHandle {
    success_tx: mpsc::Sender<Sample>,
    failure_tx: mpsc::Sender<Sample>,
    control_tx: mpsc::Sender<Control>,
    dropped: Arc<AtomicU64>,
}

impl StatsHandle {
    pub fn record_success(
        &self,
        request_type: impl Into<String>,
        name: impl Into<String>,
        response_time_ms: u64,
        response_length: u64,
    ) {
        let sample = Sample::Success {
            request_type: request_type.into(),
            name: name.into(),
            response_time_ms,
            response_length,
        };
        self.send(&self.success_tx, sample);
    }

    pub fn record_failure(
        &self,
        request_type: impl Into<String>,
        name: impl Into<String>,
        response_time_ms: u64,
        error: impl Into<String>,
    ) {
        let sample = Sample::Failure {
            request_type: request_type.into(),
            name: name.into(),
            response_time_ms,
            error: error.into(),
        };
        self.send(&self.failure_tx, sample);
    }

    fn send(&self, tx: &mpsc::Sender<Sample>, sample: Sample) {
        if tx.try_send(sample).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("stats ingress saturated, dropping sample");
        }
    }

    pub async fn control(&self, msg: Control) {
        let _ = self.control_tx.send(msg).await;
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Folds incoming samples into per-endpoint accumulators and emits
/// [`Report`]s on a timer, plus one final cumulative summary on
/// [`Control::Stop`].
pub struct StatsAggregator {
    window: HashMap<EndpointKey, EndpointAccumulator>,
    lifetime: HashMap<EndpointKey, EndpointAccumulator>,
    window_errors: HashMap<String, u64>,
    lifetime_errors: HashMap<String, u64>,
    user_count: Arc<std::sync::atomic::AtomicU32>,
    window_start_unix_ms: i64,
}

impl StatsAggregator {
    /// Spawns the aggregator task. `user_count` is a shared cell the runner
    /// updates as it resizes the worker pool; the aggregator only reads it
    /// when building a report.
    pub fn spawn(
        report_interval: Duration,
        user_count: Arc<std::sync::atomic::AtomicU32>,
    ) -> (StatsHandle, mpsc::Receiver<Arc<Report>>, JoinHandle<()>) {
        let (success_tx, success_rx) = mpsc::channel(INGRESS_CAPACITY);
        let (failure_tx, failure_rx) = mpsc::channel(INGRESS_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (report_tx, report_rx) = mpsc::channel(REPORT_CAPACITY);

        let handle = StatsHandle {
            success_tx,
            failure_tx,
            control_tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };

        let aggregator = StatsAggregator {
            window: HashMap::new(),
            lifetime: HashMap::new(),
            window_errors: HashMap::new(),
            lifetime_errors: HashMap::new(),
            user_count,
            window_start_unix_ms: now_unix_ms(),
        };

        let join = tokio::spawn(aggregator.run(success_rx, failure_rx, control_rx, report_tx, report_interval));
        (handle, report_rx, join)
    }

    async fn run(
        mut self,
        mut success_rx: mpsc::Receiver<Sample>,
        mut failure_rx: mpsc::Receiver<Sample>,
        mut control_rx: mpsc::Receiver<Control>,
        report_tx: mpsc::Sender<Arc<Report>>,
        report_interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(report_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut success_open = true;
        let mut failure_open = true;

        loop {
            tokio::select! {
                sample = success_rx.recv(), if success_open => {
                    match sample {
                        Some(sample) => self.fold(sample),
                        None => success_open = false,
                    }
                }
                sample = failure_rx.recv(), if failure_open => {
                    match sample {
                        Some(sample) => self.fold(sample),
                        None => failure_open = false,
                    }
                }
                control = control_rx.recv() => {
                    match control {
                        Some(Control::ClearAll) => {
                            self.window.clear();
                            self.lifetime.clear();
                            self.window_errors.clear();
                            self.lifetime_errors.clear();
                            self.window_start_unix_ms = now_unix_ms();
                        }
                        Some(Control::ReportNow) => {
                            self.emit_and_reset_window(&report_tx, false).await;
                        }
                        Some(Control::Stop) | None => {
                            self.emit_final_summary(&report_tx).await;
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.emit_and_reset_window(&report_tx, false).await;
                }
            }
        }
        debug!("stats aggregator stopped");
    }

    fn fold(&mut self, sample: Sample) {
        let key = sample.endpoint_key();
        let now_secs = now_unix_ms() / 1000;

        match &sample {
            Sample::Success {
                response_time_ms,
                response_length,
                ..
            } => {
                self.window
                    .entry(key.clone())
                    .or_default()
                    .record_success(*response_time_ms, *response_length, now_secs);
                self.lifetime
                    .entry(key)
                    .or_default()
                    .record_success(*response_time_ms, *response_length, now_secs);
            }
            Sample::Failure {
                response_time_ms,
                error,
                ..
            } => {
                self.window
                    .entry(key.clone())
                    .or_default()
                    .record_failure(*response_time_ms, now_secs);
                self.lifetime
                    .entry(key.clone())
                    .or_default()
                    .record_failure(*response_time_ms, now_secs);

                let error_key = format!("{}: {}: {}", key.request_type, key.name, error);
                *self.window_errors.entry(error_key.clone()).or_insert(0) += 1;
                *self.lifetime_errors.entry(error_key).or_insert(0) += 1;
            }
        }
    }

    async fn emit_and_reset_window(&mut self, report_tx: &mpsc::Sender<Arc<Report>>, is_final: bool) {
        let user_count = self.user_count.load(Ordering::Relaxed);
        let report = build_report(
            &self.window,
            &self.window_errors,
            user_count,
            self.window_start_unix_ms,
            is_final,
        );
        let _ = report_tx.send(Arc::new(report)).await;
        self.window.clear();
        self.window_errors.clear();
    }

    async fn emit_final_summary(&mut self, report_tx: &mpsc::Sender<Arc<Report>>) {
        let user_count = self.user_count.load(Ordering::Relaxed);
        let report = build_report(
            &self.lifetime,
            &self.lifetime_errors,
            user_count,
            self.window_start_unix_ms,
            true,
        );
        let _ = report_tx.send(Arc::new(report)).await;
    }
}

fn now_unix_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration as StdDuration;

    fn spawn_test_aggregator() -> (StatsHandle, mpsc::Receiver<Arc<Report>>, JoinHandle<()>, Arc<AtomicU32>) {
        let user_count = Arc::new(AtomicU32::new(0));
        let (handle, rx, join) = StatsAggregator::spawn(StdDuration::from_millis(30), user_count.clone());
        (handle, rx, join, user_count)
    }

    #[tokio::test]
    async fn reports_successes_and_failures_for_same_endpoint() {
        let (handle, mut rx, join, _users) = spawn_test_aggregator();

        handle.record_success("http", "/a", 10, 100);
        handle.record_success("http", "/a", 20, 100);
        handle.record_failure("http", "/a", 30, "boom");

        let report = rx.recv().await.expect("report");
        assert_eq!(report.total.count, 3);
        assert_eq!(report.total.failures, 1);
        assert_eq!(
            report.total.response_time_sum_ms,
            report.rows.iter().map(|r| r.response_time_sum_ms).sum::<u64>()
        );

        handle.control(Control::Stop).await;
        let _ = join.await;
    }

    #[tokio::test]
    async fn failure_error_key_format() {
        let (handle, mut rx, join, _users) = spawn_test_aggregator();
        handle.record_failure("http", "/a", 12, "boom");

        let report = rx.recv().await.expect("report");
        assert_eq!(report.errors.get("http: /a: boom"), Some(&1));

        handle.control(Control::Stop).await;
        let _ = join.await;
    }

    #[tokio::test]
    async fn window_resets_after_each_tick() {
        let (handle, mut rx, join, _users) = spawn_test_aggregator();
        handle.record_success("http", "/a", 10, 10);

        let first = rx.recv().await.expect("first report");
        assert_eq!(first.total.count, 1);

        let second = rx.recv().await.expect("second report");
        assert_eq!(second.total.count, 0, "window should reset between ticks");

        handle.control(Control::Stop).await;
        let _ = join.await;
    }

    #[tokio::test]
    async fn stop_emits_cumulative_summary() {
        let (handle, mut rx, join, _users) = spawn_test_aggregator();
        handle.record_success("http", "/a", 10, 10);
        let _ = rx.recv().await;

        handle.control(Control::Stop).await;
        let mut last = None;
        while let Some(r) = rx.recv().await {
            last = Some(r);
        }
        let summary = last.expect("final summary report");
        assert!(summary.is_final_summary);
        assert_eq!(summary.total.count, 1);
        let _ = join.await;
    }
}
