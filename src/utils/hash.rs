//! Content digests for fingerprinted file names.
//!
//! Uses blake3 over the full byte stream; only a short hex prefix ends up
//! in file names.
//!
//! # Usage
//!
//! ```ignore
//! use crate::utils::hash;
//!
//! let fp = hash::fingerprint(b"body{}"); // -> "3f1c9a0b2d4e"
//! ```

/// Number of hex chars kept from the digest.
pub const FINGERPRINT_LEN: usize = 12;

/// Compute the short hex fingerprint of in-memory data.
#[inline]
pub fn fingerprint<T: AsRef<[u8]> + ?Sized>(data: &T) -> String {
    let hash = blake3::hash(data.as_ref());
    truncate(hash.as_bytes())
}

fn truncate(bytes: &[u8; 32]) -> String {
    let mut hex = hex::encode(&bytes[..FINGERPRINT_LEN / 2]);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_length() {
        assert_eq!(fingerprint("body { color: red; }").len(), FINGERPRINT_LEN);
        assert_eq!(fingerprint("").len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = fingerprint("same bytes");
        let _ = fingerprint("something else in between");
        let b = fingerprint("same bytes");
        assert_eq!(a, b);
        assert_ne!(a, fingerprint("other bytes"));
    }
}
