//! Command-line surface over [`swarm_core::config::RunnerConfig`]. The
//! library stays config-agnostic; this is the one place `clap` enters the
//! workspace.

use std::time::Duration;

use clap::Parser;
use swarm_core::config::{parse_request_increase_rate, RampSpec, RunnerConfig};
use swarm_core::SwarmError;

#[derive(Debug, Parser)]
#[command(
    name = "swarm-cli",
    version,
    about = "Headless worker for programmable load generation, standalone or as a Locust-protocol slave"
)]
pub struct CliArgs {
    /// Master host to connect to; when set, runs as a distributed slave
    #[arg(long = "master-host")]
    pub master_host: Option<String>,

    /// Master port to connect to
    #[arg(long = "master-port", default_value_t = 5557)]
    pub master_port: u16,

    /// Hatch type: "asap" or "smooth"
    #[arg(long = "hatch-type", default_value = "asap")]
    pub hatch_type: String,

    /// Smooth hatch: users spawned per second (0 falls back to asap)
    #[arg(long = "hatch-rate", default_value_t = 0)]
    pub hatch_rate: u32,

    /// Target active user count, standalone mode only
    #[arg(long = "num-users", alias = "hatch-count", default_value_t = 1)]
    pub num_users: u32,

    /// Token-bucket ceiling on requests per second; 0 disables rate limiting
    #[arg(long = "max-rps", default_value_t = 0)]
    pub max_rps: u32,

    /// Ramp step for max-rps, as "N" (per second) or "N/Ms"
    #[arg(long = "request-increase-rate")]
    pub request_increase_rate: Option<String>,

    /// Comma-separated task names to run once each, then exit
    #[arg(long = "run-tasks", value_delimiter = ',')]
    pub run_tasks: Vec<String>,

    /// Write a CPU flamegraph to this path when the run ends (requires the
    /// `profiling` feature)
    #[arg(long = "cpu-profile")]
    pub cpu_profile: Option<String>,

    /// Stop the CPU profile after this many seconds even if the run is
    /// still going
    #[arg(long = "cpu-profile-duration", default_value_t = 30)]
    pub cpu_profile_duration: u64,

    /// Write a heap profile to this path when the run ends (requires the
    /// `profiling` feature)
    #[arg(long = "memory-profile")]
    pub memory_profile: Option<String>,

    /// Stop the memory profile after this many seconds even if the run is
    /// still going
    #[arg(long = "memory-profile-duration", default_value_t = 30)]
    pub memory_profile_duration: u64,

    /// Report interval in seconds
    #[arg(long = "report-interval", default_value_t = 3)]
    pub report_interval: u64,

    /// Heartbeat period in seconds, distributed mode only
    #[arg(long = "heartbeat-period", default_value_t = 1)]
    pub heartbeat_period: u64,

    /// Append each report window to this CSV file
    #[arg(long = "csv")]
    pub csv: Option<String>,
}

impl CliArgs {
    /// Builds a [`RunnerConfig`], resolving `hatch-type` and
    /// `request-increase-rate` the same way the facade would, so a bad flag
    /// is caught here rather than failing deep inside the runner.
    pub fn to_runner_config(&self) -> Result<RunnerConfig, SwarmError> {
        let hatch_type = self.hatch_type.parse()?;
        let request_increase_rate: Option<RampSpec> = self
            .request_increase_rate
            .as_deref()
            .map(parse_request_increase_rate)
            .transpose()?;

        let config = RunnerConfig {
            master_host: self.master_host.clone(),
            master_port: self.master_port,
            hatch_type,
            hatch_rate: self.hatch_rate,
            hatch_count: self.num_users,
            max_rps: self.max_rps,
            request_increase_rate,
            run_tasks: self.run_tasks.clone(),
            report_interval: Duration::from_secs(self.report_interval),
            heartbeat_period: Duration::from_secs(self.heartbeat_period),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_standalone_args() {
        let args = CliArgs::parse_from(["swarm-cli", "--num-users", "5"]);
        let config = args.to_runner_config().unwrap();
        assert_eq!(config.hatch_count, 5);
        assert!(!config.is_distributed());
    }

    #[test]
    fn distributed_mode_set_by_master_host() {
        let args = CliArgs::parse_from([
            "swarm-cli",
            "--master-host",
            "master.local",
            "--master-port",
            "6000",
        ]);
        let config = args.to_runner_config().unwrap();
        assert!(config.is_distributed());
        assert_eq!(config.master_port, 6000);
    }

    #[test]
    fn invalid_hatch_type_is_a_config_error() {
        let args = CliArgs::parse_from(["swarm-cli", "--hatch-type", "bogus"]);
        assert!(args.to_runner_config().is_err());
    }

    #[test]
    fn run_tasks_is_comma_split() {
        let args = CliArgs::parse_from(["swarm-cli", "--run-tasks", "hello,world"]);
        assert_eq!(args.run_tasks, vec!["hello".to_string(), "world".to_string()]);
    }
}
