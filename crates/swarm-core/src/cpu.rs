//! CPU usage sampling for the slave's heartbeat. Linux-only; other targets
//! report zero rather than failing the whole heartbeat.

/// Tracks `/proc/stat`-derived CPU busy time and turns successive samples
/// into a percentage in `[0, 100]`.
#[derive(Debug, Default)]
pub struct CpuSampler {
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    last: Option<(u64, u64)>,
}

impl CpuSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the CPU busy percentage since the previous call. The first
    /// call always returns 0.0, since there is no prior sample to diff
    /// against.
    pub fn sample(&mut self) -> f64 {
        #[cfg(target_os = "linux")]
        {
            let Some((idle, total)) = read_proc_stat() else {
                return 0.0;
            };
            let pct = match self.last {
                Some((last_idle, last_total)) => {
                    let idle_delta = idle.saturating_sub(last_idle);
                    let total_delta = total.saturating_sub(last_total);
                    if total_delta == 0 {
                        0.0
                    } else {
                        let busy_delta = total_delta.saturating_sub(idle_delta);
                        (busy_delta as f64 / total_delta as f64) * 100.0
                    }
                }
                None => 0.0,
            };
            self.last = Some((idle, total));
            pct.clamp(0.0, 100.0)
        }

        #[cfg(not(target_os = "linux"))]
        {
            0.0
        }
    }
}

#[cfg(target_os = "linux")]
fn read_proc_stat() -> Option<(u64, u64)> {
    let contents = std::fs::read_to_string("/proc/stat").ok()?;
    let line = contents.lines().next()?;
    let mut fields = line.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }
    let values: Vec<u64> = fields.filter_map(|f| f.parse().ok()).collect();
    if values.len() < 4 {
        return None;
    }
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    let total: u64 = values.iter().sum();
    Some((idle, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_is_zero() {
        let mut sampler = CpuSampler::new();
        assert_eq!(sampler.sample(), 0.0);
    }

    #[test]
    fn sample_is_always_in_valid_range() {
        let mut sampler = CpuSampler::new();
        for _ in 0..3 {
            let pct = sampler.sample();
            assert!((0.0..=100.0).contains(&pct));
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn proc_stat_parses_on_linux() {
        assert!(read_proc_stat().is_some());
    }
}
