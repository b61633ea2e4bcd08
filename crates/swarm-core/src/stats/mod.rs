//! Channel-fed stats collection: samples flow in from workers, folded
//! per-endpoint accumulators are snapshotted into [`Report`]s on a timer.

mod accumulator;
mod aggregator;
mod report;
mod sample;

pub use accumulator::{round_response_time, EndpointAccumulator, SecondBucket};
pub use aggregator::{StatsAggregator, StatsHandle, DEFAULT_REPORT_INTERVAL};
pub use report::{Control, EndpointRow, Report};
pub use sample::{EndpointKey, Sample};
