//! One-way password hashing.
//!
//! Digests are PHC strings (`$argon2id$v=19$m=…,t=…,p=…$salt$hash`), so the
//! algorithm, its parameters and the salt travel with the digest and no
//! separate salt column is needed.

use std::sync::OnceLock;

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::config::MAX_SECRET_BYTES;

/// Argon2id work factor: 19 MiB of memory, 2 passes, 1 lane.
const MEMORY_COST_KIB: u32 = 19_456;
const TIME_COST: u32 = 2;
const PARALLELISM: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("secret exceeds 72 bytes")]
    SecretTooLong,
    #[error("failed to hash secret: {0}")]
    Hashing(String),
}

fn hasher() -> Result<Argon2<'static>, CredentialError> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, None)
        .map_err(|e| CredentialError::Hashing(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

pub fn hash(secret: &str) -> Result<String, CredentialError> {
    if secret.len() > MAX_SECRET_BYTES {
        return Err(CredentialError::SecretTooLong);
    }

    let salt = SaltString::generate(&mut OsRng);
    hasher()?
        .hash_password(secret.as_bytes(), &salt)
        .map(|digest| digest.to_string())
        .map_err(|e| CredentialError::Hashing(e.to_string()))
}

/// Any failure (unparseable digest, oversized candidate, mismatch) is `false`.
pub fn verify(digest: &str, candidate: &str) -> bool {
    if candidate.len() > MAX_SECRET_BYTES {
        return false;
    }

    let parsed = match PasswordHash::new(digest) {
        Ok(h) => h,
        Err(_) => return false,
    };

    // Parameters come from the digest itself, not from `hasher()`.
    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok()
}

/// Digest used to burn the same verification time when a login names an
/// unknown account.
pub fn dummy_digest() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash("plaza-unknown-account").ok())
        .as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_the_hashed_secret() {
        for secret in ["1234567", "7654321", "", "ünïcødé pass"] {
            let digest = hash(secret).unwrap();
            assert!(verify(&digest, secret), "round trip failed for {:?}", secret);
        }
    }

    #[test]
    fn verify_rejects_other_secrets() {
        let digest = hash("1234567").unwrap();
        assert!(!verify(&digest, "7654321"));
        assert!(!verify(&digest, "1234567 "));
        assert!(!verify(&digest, ""));
    }

    #[test]
    fn digest_is_self_describing_and_salted() {
        let a = hash("same").unwrap();
        let b = hash("same").unwrap();
        assert!(a.starts_with("$argon2id$v=19$m=19456,t=2,p=1$"));
        assert_ne!(a, b);
        assert!(verify(&a, "same"));
        assert!(verify(&b, "same"));
    }

    #[test]
    fn secrets_at_the_limit_are_accepted() {
        let secret = "a".repeat(MAX_SECRET_BYTES);
        let digest = hash(&secret).unwrap();
        assert!(verify(&digest, &secret));
    }

    #[test]
    fn secrets_over_the_limit_are_rejected() {
        let secret = "a".repeat(MAX_SECRET_BYTES + 1);
        assert_eq!(hash(&secret), Err(CredentialError::SecretTooLong));

        // 25 three-byte characters is 75 bytes even though it is 25 chars.
        let multibyte = "€".repeat(25);
        assert_eq!(hash(&multibyte), Err(CredentialError::SecretTooLong));
    }

    #[test]
    fn malformed_digest_is_just_a_mismatch() {
        assert!(!verify("", "anything"));
        assert!(!verify("not-a-phc-string", "anything"));
        assert!(!verify("$argon2id$v=19$m=19456,t=2,p=1$bad", "anything"));
    }

    #[test]
    fn dummy_digest_never_matches_user_input() {
        let digest = dummy_digest().unwrap();
        assert!(!verify(digest, "password"));
    }
}
