use crate::SwarmError;

/// A single protocol message: `(type, data, node id)`, matching the wire
/// tuple layout exactly so a round trip through [`encode`]/[`decode`] is
/// lossless.
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub msg_type: String,
    pub data: serde_json::Value,
    pub node_id: String,
}

impl WireMessage {
    pub fn new(
        msg_type: impl Into<String>,
        data: serde_json::Value,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            msg_type: msg_type.into(),
            data,
            node_id: node_id.into(),
        }
    }
}

/// Encodes a message into a single MessagePack-equivalent frame.
pub fn encode(msg: &WireMessage) -> Result<Vec<u8>, SwarmError> {
    let tuple = (&msg.msg_type, &msg.data, &msg.node_id);
    rmp_serde::to_vec(&tuple).map_err(|e| SwarmError::Codec(e.to_string()))
}

/// Decodes a single frame back into a [`WireMessage`].
pub fn decode(frame: &[u8]) -> Result<WireMessage, SwarmError> {
    let (msg_type, data, node_id): (String, serde_json::Value, String) =
        rmp_serde::from_slice(frame).map_err(|e| SwarmError::Codec(e.to_string()))?;
    Ok(WireMessage {
        msg_type,
        data,
        node_id,
    })
}
