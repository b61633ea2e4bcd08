/// A single observed request outcome, produced by a task and consumed by the
/// stats aggregator.
#[derive(Debug, Clone)]
pub enum Sample {
    Success {
        request_type: String,
        name: String,
        response_time_ms: u64,
        response_length: u64,
    },
    Failure {
        request_type: String,
        name: String,
        response_time_ms: u64,
        error: String,
    },
}

impl Sample {
    pub fn endpoint_key(&self) -> EndpointKey {
        match self {
            Sample::Success {
                request_type, name, ..
            }
            | Sample::Failure {
                request_type, name, ..
            } => EndpointKey {
                request_type: request_type.clone(),
                name: name.clone(),
            },
        }
    }
}

/// Bucketing key for per-endpoint accumulators: `(request_type, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    pub request_type: String,
    pub name: String,
}

impl EndpointKey {
    pub fn new(request_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            request_type: request_type.into(),
            name: name.into(),
        }
    }
}
