mod args;
mod demo_tasks;
mod output;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use swarm_core::ratelimiter::{RampedBucket, RateLimiter, StableBucket};
use swarm_core::Boomer;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use args::CliArgs;
use output::{ConsoleOutput, CsvOutput};

#[cfg(feature = "profiling")]
mod profiling;

#[cfg(feature = "profiling")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

#[tokio::main]
async fn main() -> ExitCode {
    install_logging();

    let args = CliArgs::parse();
    let config = match args.to_runner_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    #[cfg(feature = "profiling")]
    let _cpu_guard = profiling::maybe_start_cpu_profile(&args);
    #[cfg(feature = "profiling")]
    let _memory_guard = profiling::maybe_start_memory_profile(&args);

    let boomer = Boomer::new(config.clone());

    if config.max_rps > 0 {
        let limiter: Arc<dyn RateLimiter> = match config.request_increase_rate {
            Some(ramp) => RampedBucket::new(
                u64::from(config.max_rps),
                u64::from(ramp.step_tokens),
                ramp.step_period,
                Duration::from_secs(1),
            ),
            None => StableBucket::new(u64::from(config.max_rps)),
        };
        boomer.set_rate_limiter(limiter).await;
    }

    boomer.add_output(Arc::new(ConsoleOutput)).await;
    if let Some(path) = &args.csv {
        boomer.add_output(Arc::new(CsvOutput::new(path.clone()))).await;
    }

    let tasks = demo_tasks::build(boomer.clone());

    info!(
        distributed = config.is_distributed(),
        hatch_count = config.hatch_count,
        "starting swarm-cli"
    );

    if let Err(e) = boomer.run(tasks).await {
        error!(error = %e, "failed to start run");
        return ExitCode::FAILURE;
    }

    if !config.run_tasks.is_empty() {
        // `run()` already executed the named tasks once each and returned
        // without starting a pool; nothing left to wait on.
        return ExitCode::SUCCESS;
    }

    wait_for_shutdown_signal().await;
    boomer.quit().await;
    info!("shutdown complete");
    ExitCode::SUCCESS
}

fn install_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

/// Resolves on SIGINT or SIGTERM, the signals §6 documents as triggering a
/// graceful shutdown equivalent to calling `Quit`.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c");
    }
}
