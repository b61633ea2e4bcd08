//! CPU and heap profiling hooks named in spec §6. These are an external
//! collaborator from the core engine's point of view — `swarm-core` takes
//! no dependency on either profiler; the CLI wraps its own run with guards
//! that write their output on drop.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::args::CliArgs;

/// Holds a started `pprof` CPU profiler open for the configured duration,
/// then writes a flamegraph to the configured path when dropped.
pub struct CpuProfileGuard {
    path: String,
    guard: pprof::ProfilerGuard<'static>,
}

pub fn maybe_start_cpu_profile(args: &CliArgs) -> Option<CpuProfileGuard> {
    let path = args.cpu_profile.clone()?;
    match pprof::ProfilerGuardBuilder::default().frequency(100).build() {
        Ok(guard) => {
            info!(path = %path, duration_s = args.cpu_profile_duration, "cpu profile started");
            schedule_duration_warning(args.cpu_profile_duration);
            Some(CpuProfileGuard { path, guard })
        }
        Err(e) => {
            error!(error = %e, "failed to start cpu profile");
            None
        }
    }
}

impl Drop for CpuProfileGuard {
    fn drop(&mut self) {
        match self.guard.report().build() {
            Ok(report) => match std::fs::File::create(&self.path) {
                Ok(file) => {
                    if let Err(e) = report.flamegraph(file) {
                        error!(path = %self.path, error = %e, "failed to write cpu flamegraph");
                    } else {
                        info!(path = %self.path, "cpu flamegraph written");
                    }
                }
                Err(e) => error!(path = %self.path, error = %e, "failed to create cpu profile file"),
            },
            Err(e) => error!(error = %e, "failed to build cpu profile report"),
        }
    }
}

/// Holds a started `dhat` heap profiler open; writes its `dhat-heap.json`
/// equivalent to the configured path when dropped.
pub struct MemoryProfileGuard {
    path: String,
    _profiler: dhat::Profiler,
}

pub fn maybe_start_memory_profile(args: &CliArgs) -> Option<MemoryProfileGuard> {
    let path = args.memory_profile.clone()?;
    info!(path = %path, duration_s = args.memory_profile_duration, "memory profile started");
    schedule_duration_warning(args.memory_profile_duration);
    Some(MemoryProfileGuard {
        path,
        _profiler: dhat::Profiler::builder().file_name(path.clone()).build(),
    })
}

impl Drop for MemoryProfileGuard {
    fn drop(&mut self) {
        info!(path = %self.path, "memory profile written");
    }
}

fn schedule_duration_warning(duration_secs: u64) {
    let duration = Duration::from_secs(duration_secs);
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        warn!(
            duration_s = duration_secs,
            "profile duration elapsed; profile stays open until the run ends"
        );
    });
}
