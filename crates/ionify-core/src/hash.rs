//! Deterministic SHA-256 hashing for content and cache keys.
//!
//! Pure functions, no I/O, no state. Everything derived on disk (graph
//! namespaces, CAS keys, transform memo keys) goes through here so that
//! two processes given the same inputs agree byte-for-byte.

use sha2::{Digest, Sha256};

/// A raw 32-byte SHA-256 digest.
pub type Hash256 = [u8; 32];

/// Hash a single byte slice.
pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Hash an ordered sequence of parts with domain separation.
///
/// Each part is length-prefixed before being fed to the digest, so
/// `["ab", "c"]` and `["a", "bc"]` produce different hashes. Used for
/// composite cache keys (module hash + loader signature).
pub fn hash_many<I, B>(parts: I) -> Hash256
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        let bytes = part.as_ref();
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    hasher.finalize().into()
}

/// Hex-encode a digest.
pub fn to_hex(digest: &Hash256) -> String {
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes_deterministic() {
        let a = hash_bytes(b"hello");
        let b = hash_bytes(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, hash_bytes(b"hello!"));
    }

    #[test]
    fn test_hash_bytes_known_vector() {
        // SHA-256 of the empty string
        assert_eq!(
            to_hex(&hash_bytes(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_many_domain_separated() {
        let a = hash_many(["ab", "c"]);
        let b = hash_many(["a", "bc"]);
        assert_ne!(a, b, "length prefixing must separate part boundaries");
    }

    #[test]
    fn test_hash_many_order_sensitive() {
        assert_ne!(hash_many(["a", "b"]), hash_many(["b", "a"]));
    }

    #[test]
    fn test_hash_many_empty() {
        // Hashing no parts is still well-defined and stable
        assert_eq!(hash_many::<_, &[u8]>([]), hash_many::<_, &[u8]>([]));
    }
}
