//! Content fingerprinting for cache keys
//!
//! Every cache artifact is addressed by a fingerprint: the first 16 hex
//! characters of a SHA-256 digest over the relevant input bytes. Stage 1
//! keys on the raw PDF bytes; later stages reuse the same fingerprint so a
//! given PDF maps to one key family across the whole pipeline.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the full digest
pub const FINGERPRINT_LEN: usize = 16;

/// Calculate the content fingerprint of a byte sequence
///
/// Returns a 16-character lowercase hexadecimal string. The same input
/// always produces the same output across runs and machines. Collisions
/// are treated as infeasible; there is no collision-resolution code path.
///
/// # Examples
///
/// ```
/// use skillsmith_core::hash::fingerprint;
///
/// let fp = fingerprint(b"tax guide bytes");
/// assert_eq!(fp.len(), 16);
/// assert_eq!(fp, fingerprint(b"tax guide bytes"));
/// ```
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let hex = format!("{:x}", digest);
    hex[..FINGERPRINT_LEN].to_string()
}

/// Check that a string is a well-formed fingerprint
///
/// Fingerprints are opaque identifiers; this only verifies shape (16
/// lowercase hex characters), never content.
pub fn is_valid_fingerprint(value: &str) -> bool {
    value.len() == FINGERPRINT_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_shape() {
        let fp = fingerprint(b"content");
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_deterministic() {
        assert_eq!(fingerprint(b"same bytes"), fingerprint(b"same bytes"));
    }

    #[test]
    fn test_fingerprint_differs_on_content() {
        assert_ne!(fingerprint(b"guide a"), fingerprint(b"guide b"));
    }

    #[test]
    fn test_fingerprint_empty_input() {
        // Prefix of the well-known SHA-256 of the empty string
        assert_eq!(fingerprint(b""), "e3b0c44298fc1c14");
    }

    #[test]
    fn test_is_valid_fingerprint() {
        assert!(is_valid_fingerprint(&fingerprint(b"x")));
        assert!(!is_valid_fingerprint("short"));
        assert!(!is_valid_fingerprint("E3B0C44298FC1C14"));
        assert!(!is_valid_fingerprint("g3b0c44298fc1c14"));
    }
}
