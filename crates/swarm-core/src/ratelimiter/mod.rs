//! Token-bucket admission control, with an optional linear ramp-up of the
//! refill rate.

mod ramped;
mod stable;

pub use ramped::RampedBucket;
pub use stable::StableBucket;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub const DEFAULT_REFILL_PERIOD: Duration = Duration::from_secs(1);

/// Result of asking a [`RateLimiter`] for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Open,
    Closed,
}

/// Admission control contract shared by the stable and ramped buckets.
///
/// `start` takes `self: Arc<Self>` rather than `&self` so the refill loop it
/// spawns can hold its own `Arc` clone and outlive the call that started it,
/// without resorting to unsafe lifetime extension. Callers do
/// `limiter.clone().start()`.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    fn start(self: Arc<Self>);
    async fn acquire(&self) -> Admission;
    async fn stop(&self);
}
