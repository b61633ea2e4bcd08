//! [`Output`] implementations the CLI wires up: a console table printer
//! (always on) and an optional CSV appender.

use std::sync::Arc;

use async_trait::async_trait;
use swarm_core::stats::Report;
use swarm_core::Output;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Prints each report window as a one-line-per-endpoint table to stdout,
/// the same shape Locust's console output uses.
pub struct ConsoleOutput;

#[async_trait]
impl Output for ConsoleOutput {
    async fn on_start(&self) {
        info!("load test started");
    }

    async fn on_event(&self, report: Arc<Report>) {
        println!(
            "{:<8} {:<24} {:>8} {:>8} {:>10} {:>8} {:>8} {:>10}",
            "type", "name", "count", "fails", "avg(ms)", "min", "max", "rps"
        );
        for row in &report.rows {
            let avg = if row.count > 0 {
                row.response_time_sum_ms as f64 / row.count as f64
            } else {
                0.0
            };
            println!(
                "{:<8} {:<24} {:>8} {:>8} {:>10.1} {:>8} {:>8} {:>10.2}",
                row.request_type, row.name, row.count, row.failures, avg, row.min_ms, row.max_ms, row.requests_per_second
            );
        }
        println!(
            "{:<8} {:<24} {:>8} {:>8} {:>10} {:>8} {:>8} {:>10.2}  users={}",
            report.total.request_type,
            report.total.name,
            report.total.count,
            report.total.failures,
            "",
            report.total.min_ms,
            report.total.max_ms,
            report.total.requests_per_second,
            report.user_count,
        );
        for (error_key, count) in &report.errors {
            println!("  error: {error_key} ({count})");
        }
    }

    async fn on_stop(&self) {
        info!("load test stopped");
    }
}

/// Appends one row per endpoint per report window to a CSV file.
pub struct CsvOutput {
    path: String,
    header_written: Mutex<bool>,
}

impl CsvOutput {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            header_written: Mutex::new(false),
        }
    }

    async fn append(&self, line: &str) {
        let mut file = match OpenOptions::new().create(true).append(true).open(&self.path).await {
            Ok(file) => file,
            Err(e) => {
                error!(path = %self.path, error = %e, "failed to open csv output");
                return;
            }
        };
        if let Err(e) = file.write_all(line.as_bytes()).await {
            error!(path = %self.path, error = %e, "failed to write csv row");
        }
    }
}

#[async_trait]
impl Output for CsvOutput {
    async fn on_event(&self, report: Arc<Report>) {
        let mut header_written = self.header_written.lock().await;
        if !*header_written {
            self.append("request_type,name,count,failures,response_time_sum_ms,min_ms,max_ms,rps,user_count\n")
                .await;
            *header_written = true;
        }
        drop(header_written);

        for row in &report.rows {
            let line = format!(
                "{},{},{},{},{},{},{},{:.2},{}\n",
                row.request_type,
                row.name,
                row.count,
                row.failures,
                row.response_time_sum_ms,
                row.min_ms,
                row.max_ms,
                row.requests_per_second,
                report.user_count,
            );
            self.append(&line).await;
        }
    }
}
