use serde::Serialize;

/// Errors surfaced across configuration, codec and transport boundaries.
///
/// Per the error-handling design, most runtime failures (task errors,
/// dropped samples, missed heartbeats) are never turned into a `SwarmError`
/// — they are captured as stats or logged and handled in place. This enum
/// is reserved for configuration-time and setup-time failures.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Serialize for SwarmError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
