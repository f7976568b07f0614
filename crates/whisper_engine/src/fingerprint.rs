use sha2::{Digest, Sha256};

/// Content-derived message id for platforms without a stable DOM id.
///
/// `ordinal` counts earlier items in the same snapshot with identical sender,
/// timestamp and text, so repeated "ok"s stay distinct while a re-render of the
/// same list yields the same ids.
pub fn message_fingerprint(sender: &str, timestamp: &str, text: &str, ordinal: usize) -> String {
    let text_hash = short_hash(text.as_bytes(), 8);
    let key = format!("{sender}\u{1f}{timestamp}\u{1f}{text_hash}\u{1f}{ordinal}");
    format!("fp-{}", short_hash(key.as_bytes(), 8))
}

/// Id for a node that carries a platform message id attribute.
pub fn stable_message_id(platform_id: &str, raw: &str) -> String {
    format!("{platform_id}:{}", raw.trim())
}

fn short_hash(input: &[u8], bytes: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(bytes * 2);
    for byte in digest.iter().take(bytes) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::message_fingerprint;

    #[test]
    fn fingerprint_is_deterministic_and_ordinal_sensitive() {
        let a = message_fingerprint("Alice", "10:01", "ok", 0);
        assert_eq!(a, message_fingerprint("Alice", "10:01", "ok", 0));
        assert_ne!(a, message_fingerprint("Alice", "10:01", "ok", 1));
        assert_ne!(a, message_fingerprint("Bob", "10:01", "ok", 0));
        assert!(a.starts_with("fp-"));
        assert_eq!(a.len(), 3 + 16);
    }
}
