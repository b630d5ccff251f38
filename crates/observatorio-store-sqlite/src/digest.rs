//! Content digests used to detect values corrupted outside the store.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `value`.
pub fn digest(value: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(value.as_bytes());
  hex::encode(hasher.finalize())
}
