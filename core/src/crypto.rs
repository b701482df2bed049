use std::fmt;

use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Per-request token allow-listed in the CSP header as `'nonce-<value>'`.
///
/// 16 random bytes, base64 (standard alphabet, padded) as required by the
/// `nonce-source` grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce(String);

impl Nonce {
    pub fn generate() -> Self {
        Self(base64::engine::general_purpose::STANDARD.encode(random_bytes(16)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Nonce {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a session identifier: 32 random bytes hex-encoded.
pub fn generate_session_id() -> String {
    hex::encode(random_bytes(32))
}

/// CSP hash source for a resource body: `sha256-` + BASE64(SHA256(content)).
pub fn sha256_source(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!(
        "sha256-{}",
        base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
    )
}

fn random_bytes(n: usize) -> Vec<u8> {
    (0..n).map(|_| rand::thread_rng().r#gen::<u8>()).collect()
}
