//! Password digests and session token generation

use sha2::{Digest, Sha256};

/// Length in bytes of the random part of a session token
const TOKEN_BYTES: usize = 32;

/// Salted SHA-256 password digests.
///
/// Every account shares the same salt, so equal passwords produce equal
/// digests. A per-user random salt would be stronger.
#[derive(Clone)]
pub struct PasswordHasher {
    salt: String,
}

impl PasswordHasher {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Hex-encoded `sha256(password || salt)`
    pub fn hash(&self, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hasher.update(self.salt.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify(&self, password: &str, expected_hash: &str) -> bool {
        constant_time_eq(self.hash(password).as_bytes(), expected_hash.as_bytes())
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Generate a session token: 256 bits from the thread-local CSPRNG, hex encoded (64 chars)
pub fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hash_is_deterministic_and_salted() {
        let hasher = PasswordHasher::new("salt-a");
        assert_eq!(hasher.hash("secret"), hasher.hash("secret"));
        assert_ne!(hasher.hash("secret"), hasher.hash("Secret"));

        let other = PasswordHasher::new("salt-b");
        assert_ne!(hasher.hash("secret"), other.hash("secret"));
    }

    #[test]
    fn test_hash_matches_sha256_of_password_and_salt() {
        let hasher = PasswordHasher::new("powermeter_salt_2024");
        let expected = hex::encode(Sha256::digest(b"adminpowermeter_salt_2024"));
        assert_eq!(hasher.hash("admin"), expected);
    }

    #[test]
    fn test_verify() {
        let hasher = PasswordHasher::new("s");
        let hash = hasher.hash("pw");
        assert!(hasher.verify("pw", &hash));
        assert!(!hasher.verify("pw2", &hash));
        assert!(!hasher.verify("pw", "short"));
    }

    #[test]
    fn test_tokens_are_fixed_length_hex_and_unique() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 1000);
        for token in &tokens {
            assert_eq!(token.len(), 64);
            assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
