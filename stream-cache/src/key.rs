use sha2::{Digest, Sha256};

/// Builds a stable cache key from heterogeneous request parts.
///
/// Parts are length-prefixed before hashing so `["ab", "c"]` and
/// `["a", "bc"]` never collide.
pub fn fetch_key<S: AsRef<str>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        let part = part.as_ref();
        hasher.update(part.len().to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
