use std::collections::HashMap;

/// Rounds a response time down into the same logarithmic buckets Locust
/// uses: exact below 100ms, nearest 10ms below 1000ms, nearest 100ms above.
pub fn round_response_time(ms: u64) -> u64 {
    if ms < 100 {
        ms
    } else if ms < 1000 {
        (ms / 10) * 10
    } else {
        (ms / 100) * 100
    }
}

/// Per-second counters, keyed by wall-clock second, used to derive a
/// scheduler-jitter-resistant requests-per-second figure.
#[derive(Debug, Clone, Default)]
pub struct SecondBucket {
    pub count: u64,
    pub failures: u64,
    pub response_time_sum_ms: u64,
}

/// All statistics folded for a single `(request_type, name)` endpoint.
///
/// **Invariant:** `failures <= count`; all sums are non-negative; `min_ms`
/// and `max_ms` bracket every observed sample.
#[derive(Debug, Clone, Default)]
pub struct EndpointAccumulator {
    pub count: u64,
    pub failures: u64,
    pub response_time_sum_ms: u64,
    pub min_ms: Option<u64>,
    pub max_ms: Option<u64>,
    pub response_length_sum: u64,
    /// bucketed (rounded) response time in ms -> occurrence count
    pub histogram: HashMap<u64, u64>,
    /// wall-clock second -> counters observed in that second
    pub per_second: HashMap<i64, SecondBucket>,
}

impl EndpointAccumulator {
    pub fn record_success(&mut self, response_time_ms: u64, response_length: u64, now_secs: i64) {
        self.count += 1;
        self.response_time_sum_ms += response_time_ms;
        self.response_length_sum += response_length;
        self.update_min_max(response_time_ms);
        *self
            .histogram
            .entry(round_response_time(response_time_ms))
            .or_insert(0) += 1;

        let bucket = self.per_second.entry(now_secs).or_default();
        bucket.count += 1;
        bucket.response_time_sum_ms += response_time_ms;
    }

    pub fn record_failure(&mut self, response_time_ms: u64, now_secs: i64) {
        self.count += 1;
        self.failures += 1;
        self.response_time_sum_ms += response_time_ms;
        self.update_min_max(response_time_ms);
        *self
            .histogram
            .entry(round_response_time(response_time_ms))
            .or_insert(0) += 1;

        let bucket = self.per_second.entry(now_secs).or_default();
        bucket.count += 1;
        bucket.failures += 1;
        bucket.response_time_sum_ms += response_time_ms;
    }

    fn update_min_max(&mut self, response_time_ms: u64) {
        self.min_ms = Some(self.min_ms.map_or(response_time_ms, |m| m.min(response_time_ms)));
        self.max_ms = Some(self.max_ms.map_or(response_time_ms, |m| m.max(response_time_ms)));
    }

    /// Requests per second over the window, using the number of distinct
    /// seconds observed rather than wall-clock elapsed time.
    pub fn requests_per_second(&self) -> f64 {
        let seconds = self.per_second.len();
        if seconds == 0 {
            return 0.0;
        }
        self.count as f64 / seconds as f64
    }

    /// Folds `other` into `self`, used to build the synthesized Total row.
    pub fn merge(&mut self, other: &EndpointAccumulator) {
        self.count += other.count;
        self.failures += other.failures;
        self.response_time_sum_ms += other.response_time_sum_ms;
        self.response_length_sum += other.response_length_sum;
        if let Some(min) = other.min_ms {
            self.min_ms = Some(self.min_ms.map_or(min, |m| m.min(min)));
        }
        if let Some(max) = other.max_ms {
            self.max_ms = Some(self.max_ms.map_or(max, |m| m.max(max)));
        }
        for (bucket, count) in &other.histogram {
            *self.histogram.entry(*bucket).or_insert(0) += count;
        }
        for (second, bucket) in &other.per_second {
            let entry = self.per_second.entry(*second).or_default();
            entry.count += bucket.count;
            entry.failures += bucket.failures;
            entry.response_time_sum_ms += bucket.response_time_sum_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_response_time_buckets() {
        assert_eq!(round_response_time(42), 42);
        assert_eq!(round_response_time(99), 99);
        assert_eq!(round_response_time(104), 100);
        assert_eq!(round_response_time(999), 990);
        assert_eq!(round_response_time(1234), 1200);
        assert_eq!(round_response_time(10_050), 10_000);
    }

    #[test]
    fn success_and_failure_counts_add_up() {
        let mut acc = EndpointAccumulator::default();
        acc.record_success(10, 100, 0);
        acc.record_success(20, 200, 0);
        acc.record_failure(30, 0);
        assert_eq!(acc.count, 3);
        assert_eq!(acc.failures, 1);
        assert!(acc.failures <= acc.count);
        assert_eq!(acc.response_time_sum_ms, 60);
    }

    #[test]
    fn min_max_bracket_observed_samples() {
        let mut acc = EndpointAccumulator::default();
        acc.record_success(50, 1, 0);
        acc.record_success(5, 1, 0);
        acc.record_failure(200, 0);
        assert_eq!(acc.min_ms, Some(5));
        assert_eq!(acc.max_ms, Some(200));
    }

    #[test]
    fn merge_sums_both_sides() {
        let mut a = EndpointAccumulator::default();
        a.record_success(10, 10, 0);
        let mut b = EndpointAccumulator::default();
        b.record_success(20, 20, 1);
        b.record_failure(30, 1);

        a.merge(&b);
        assert_eq!(a.count, 3);
        assert_eq!(a.failures, 1);
        assert_eq!(a.response_length_sum, 30);
    }

    #[test]
    fn requests_per_second_uses_distinct_seconds_not_wall_time() {
        let mut acc = EndpointAccumulator::default();
        acc.record_success(1, 1, 0);
        acc.record_success(1, 1, 0);
        acc.record_success(1, 1, 5);
        // Two distinct seconds observed (0 and 5), three requests total.
        assert!((acc.requests_per_second() - 1.5).abs() < f64::EPSILON);
    }
}
