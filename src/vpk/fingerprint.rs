use xxhash_rust::xxh64::xxh64;

/// Content fingerprint used as the deduplication key: a stable 64-bit hash
/// rendered as 16 lowercase hex characters. Computed over the raw chunk
/// bytes before any codec runs, so identical content deduplicates across
/// compression settings.
pub fn fingerprint(data: &[u8]) -> String {
    format!("{:016x}", xxh64(data, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_stable_and_hex() {
        let a = fingerprint(b"hello");
        let b = fingerprint(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn distinct_content_gets_distinct_keys() {
        assert_ne!(fingerprint(b"hello"), fingerprint(b"world"));
    }
}
