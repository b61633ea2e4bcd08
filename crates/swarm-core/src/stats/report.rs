use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::accumulator::EndpointAccumulator;
use super::sample::EndpointKey;

/// Control messages accepted on the aggregator's control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    ClearAll,
    ReportNow,
    Stop,
}

/// A single endpoint's counters, flattened for wire transmission. Using a
/// `Vec` of rows rather than a `HashMap<EndpointKey, _>` keeps this directly
/// serializable — msgpack maps need string-ish keys, and `EndpointKey` isn't
/// one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointRow {
    pub request_type: String,
    pub name: String,
    pub count: u64,
    pub failures: u64,
    pub response_time_sum_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub response_length_sum: u64,
    pub requests_per_second: f64,
}

impl EndpointRow {
    fn from_accumulator(key: &EndpointKey, acc: &EndpointAccumulator) -> Self {
        Self {
            request_type: key.request_type.clone(),
            name: key.name.clone(),
            count: acc.count,
            failures: acc.failures,
            response_time_sum_ms: acc.response_time_sum_ms,
            min_ms: acc.min_ms.unwrap_or(0),
            max_ms: acc.max_ms.unwrap_or(0),
            response_length_sum: acc.response_length_sum,
            requests_per_second: acc.requests_per_second(),
        }
    }
}

/// A snapshot emitted by the aggregator on each report tick, or once more as
/// a cumulative summary when the run stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub rows: Vec<EndpointRow>,
    pub total: EndpointRow,
    pub errors: HashMap<String, u64>,
    pub user_count: u32,
    /// Fixed at aggregator creation time; never reset between windows so
    /// that a final summary report still reflects the whole run.
    pub window_start_unix_ms: i64,
    /// `true` only for the one report emitted in response to `Control::Stop`.
    pub is_final_summary: bool,
}

pub(super) fn build_report(
    endpoints: &HashMap<EndpointKey, EndpointAccumulator>,
    errors: &HashMap<String, u64>,
    user_count: u32,
    window_start_unix_ms: i64,
    is_final_summary: bool,
) -> Report {
    let mut rows: Vec<EndpointRow> = endpoints
        .iter()
        .map(|(key, acc)| EndpointRow::from_accumulator(key, acc))
        .collect();
    rows.sort_by(|a, b| (&a.request_type, &a.name).cmp(&(&b.request_type, &b.name)));

    let mut total_acc = EndpointAccumulator::default();
    for acc in endpoints.values() {
        total_acc.merge(acc);
    }
    let total = EndpointRow::from_accumulator(
        &EndpointKey::new("", "Total"),
        &total_acc,
    );

    Report {
        rows,
        total,
        errors: errors.clone(),
        user_count,
        window_start_unix_ms,
        is_final_summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_row_is_componentwise_sum_of_endpoint_rows() {
        let mut endpoints = HashMap::new();
        let mut a = EndpointAccumulator::default();
        a.record_success(10, 100, 0);
        a.record_failure(20, 0);
        endpoints.insert(EndpointKey::new("http", "/a"), a);

        let mut b = EndpointAccumulator::default();
        b.record_success(30, 50, 0);
        endpoints.insert(EndpointKey::new("http", "/b"), b);

        let errors = HashMap::new();
        let report = build_report(&endpoints, &errors, 5, 0, false);

        let expected_count: u64 = report.rows.iter().map(|r| r.count).sum();
        let expected_failures: u64 = report.rows.iter().map(|r| r.failures).sum();
        let expected_response_sum: u64 = report.rows.iter().map(|r| r.response_time_sum_ms).sum();

        assert_eq!(report.total.count, expected_count);
        assert_eq!(report.total.failures, expected_failures);
        assert_eq!(report.total.response_time_sum_ms, expected_response_sum);
    }

    #[test]
    fn report_round_trips_through_msgpack() {
        let endpoints = HashMap::new();
        let errors = HashMap::new();
        let report = build_report(&endpoints, &errors, 0, 0, false);

        let encoded = rmp_serde::to_vec_named(&report).unwrap();
        let decoded: Report = rmp_serde::from_slice(&encoded).unwrap();
        assert_eq!(decoded.user_count, report.user_count);
    }
}
