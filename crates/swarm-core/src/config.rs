//! Configuration accepted by a runner: hatch plan, rate limiting, master
//! endpoint and the handful of one-shot/profiling knobs the facade exposes.

use std::time::Duration;

use crate::pool::HatchPlan;
use crate::SwarmError;

/// A parsed `request-increase-rate` ramp step: `step_tokens` added every
/// `step_period`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampSpec {
    pub step_tokens: u32,
    pub step_period: Duration,
}

/// Parses the `N` or `N/Ms` forms accepted by `request-increase-rate`.
/// `"10"` means 10 tokens added every second; `"10/5s"` means 10 tokens
/// added every 5 seconds.
pub fn parse_request_increase_rate(input: &str) -> Result<RampSpec, SwarmError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SwarmError::Validation(
            "request-increase-rate must not be empty".to_string(),
        ));
    }

    if let Some((tokens_part, period_part)) = input.split_once('/') {
        let step_tokens: u32 = tokens_part.parse().map_err(|_| {
            SwarmError::Validation(format!("invalid token count in '{input}'"))
        })?;
        let seconds_str = period_part.strip_suffix('s').ok_or_else(|| {
            SwarmError::Validation(format!(
                "invalid period in '{input}': expected a trailing 's'"
            ))
        })?;
        let seconds: f64 = seconds_str.parse().map_err(|_| {
            SwarmError::Validation(format!("invalid period in '{input}'"))
        })?;
        if seconds <= 0.0 {
            return Err(SwarmError::Validation(format!(
                "period in '{input}' must be positive"
            )));
        }
        Ok(RampSpec {
            step_tokens,
            step_period: Duration::from_secs_f64(seconds),
        })
    } else {
        let step_tokens: u32 = input
            .parse()
            .map_err(|_| SwarmError::Validation(format!("invalid request-increase-rate '{input}'")))?;
        Ok(RampSpec {
            step_tokens,
            step_period: Duration::from_secs(1),
        })
    }
}

/// `hatch-type` as accepted by the facade: anything else is a configuration
/// error at parse time, not silently coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HatchType {
    Asap,
    Smooth,
}

impl std::str::FromStr for HatchType {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asap" => Ok(HatchType::Asap),
            "smooth" => Ok(HatchType::Smooth),
            other => Err(SwarmError::Validation(format!(
                "hatch-type must be 'asap' or 'smooth', got '{other}'"
            ))),
        }
    }
}

/// Full configuration for a standalone or distributed runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub master_host: Option<String>,
    pub master_port: u16,
    pub hatch_type: HatchType,
    pub hatch_rate: u32,
    pub hatch_count: u32,
    pub max_rps: u32,
    pub request_increase_rate: Option<RampSpec>,
    pub run_tasks: Vec<String>,
    pub report_interval: Duration,
    pub heartbeat_period: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            master_host: None,
            master_port: 5557,
            hatch_type: HatchType::Asap,
            hatch_rate: 0,
            hatch_count: 1,
            max_rps: 0,
            request_increase_rate: None,
            run_tasks: Vec::new(),
            report_interval: Duration::from_secs(3),
            heartbeat_period: Duration::from_secs(1),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<(), SwarmError> {
        if self.hatch_count == 0 && self.run_tasks.is_empty() {
            return Err(SwarmError::Validation(
                "hatch-count must be positive unless run-tasks is set".to_string(),
            ));
        }
        if let Some(host) = &self.master_host {
            if host.is_empty() {
                return Err(SwarmError::Validation(
                    "master-host must not be empty when set".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Resolves the configured hatch type/rate into a concrete [`HatchPlan`],
    /// applying the zero-rate-means-asap fallback.
    pub fn hatch_plan(&self) -> HatchPlan {
        match self.hatch_type {
            HatchType::Asap => HatchPlan::Asap,
            HatchType::Smooth => HatchPlan::smooth(self.hatch_rate),
        }
    }

    pub fn is_distributed(&self) -> bool {
        self.master_host.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_integer_as_per_second_step() {
        let spec = parse_request_increase_rate("10").unwrap();
        assert_eq!(spec.step_tokens, 10);
        assert_eq!(spec.step_period, Duration::from_secs(1));
    }

    #[test]
    fn parses_n_over_m_seconds_form() {
        let spec = parse_request_increase_rate("10/5s").unwrap();
        assert_eq!(spec.step_tokens, 10);
        assert_eq!(spec.step_period, Duration::from_secs(5));
    }

    #[test]
    fn rejects_missing_seconds_suffix() {
        let err = parse_request_increase_rate("10/5").unwrap_err();
        assert!(matches!(err, SwarmError::Validation(_)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_request_increase_rate("abc").is_err());
        assert!(parse_request_increase_rate("").is_err());
    }

    #[test]
    fn hatch_type_rejects_unknown_values() {
        assert!("asap".parse::<HatchType>().is_ok());
        assert!("smooth".parse::<HatchType>().is_ok());
        assert!("bogus".parse::<HatchType>().is_err());
    }

    #[test]
    fn validate_rejects_zero_hatch_count_without_run_tasks() {
        let mut cfg = RunnerConfig {
            hatch_count: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        cfg.run_tasks.push("hello".to_string());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_smooth_rate_resolves_to_asap_plan() {
        let cfg = RunnerConfig {
            hatch_type: HatchType::Smooth,
            hatch_rate: 0,
            ..Default::default()
        };
        assert_eq!(cfg.hatch_plan(), crate::pool::HatchPlan::Asap);
    }
}
