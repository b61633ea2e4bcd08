use rand::RngCore;

/// Generates a node id stable for the process's lifetime:
/// `<hostname>_<32 hex chars>`.
pub fn generate_node_id() -> String {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());

    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let suffix = bytes.iter().map(|b| format!("{b:02x}")).collect::<String>();

    format!("{hostname}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_has_expected_shape() {
        let id = generate_node_id();
        let (_host, suffix) = id.rsplit_once('_').expect("node id must contain a separator");
        assert_eq!(suffix.len(), 32);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn node_ids_are_not_trivially_repeated() {
        let a = generate_node_id();
        let b = generate_node_id();
        assert_ne!(a, b);
    }
}
