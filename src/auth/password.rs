//! Password hashing and verification (Argon2id).
//!
//! [`hash_password`] salts with [`OsRng`] and returns a PHC string
//! (`$argon2id$v=19$...`), which is what the `users.password_hash` column stores.
//! [`verify_password`] delegates to the algorithm's own verifier, so the
//! comparison is constant-time. Neither function logs its inputs.

use std::fmt;

use argon2::{
    Argon2,
    password_hash::{
        PasswordHash as PhcHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

use crate::error::{AppError, AppResult};

/// A stored PHC-format password hash.
///
/// Has no `Serialize` impl and a redacted `Debug`: it never reaches a response
/// body or a log line.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wraps a hash read back from storage.
    pub fn from_stored(phc: String) -> Self {
        Self(phc)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

/// Hash a plaintext password with Argon2id and a fresh random salt.
pub fn hash_password(plaintext: &str) -> AppResult<PasswordHash> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))?;
    Ok(PasswordHash(hash.to_string()))
}

/// Hash on tokio's blocking pool; Argon2 is CPU and memory heavy.
pub async fn hash_password_blocking(plaintext: String) -> AppResult<PasswordHash> {
    tokio::task::spawn_blocking(move || hash_password(&plaintext))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
}

/// Check a plaintext password against a stored hash.
///
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(plaintext: &str, hash: &PasswordHash) -> bool {
    match PhcHash::new(hash.as_str()) {
        Ok(parsed) => Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("stored password hash is malformed: {e}");
            false
        }
    }
}

/// A well-formed Argon2id hash (default cost) that no password is known to match.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$XVBw+vX6H6L8CTpEln/YYQ$ilo7mEGzvn5dS6MtebBR7NhMwFvXGWN0mc7a+/6GsgQ";

/// Runs a full verification that fails. Called when no account matches, so an
/// unknown email costs as much time as a wrong password.
pub fn verify_dummy(plaintext: &str) -> bool {
    verify_password(plaintext, &PasswordHash(DUMMY_HASH.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_accepts_the_same_password() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(hash.as_str().starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery staple", &hash));
    }

    #[test]
    fn verify_rejects_a_different_password() {
        let hash = hash_password("s3cret").unwrap();
        assert!(!verify_password("S3cret", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_never_verifies() {
        let bogus = PasswordHash::from_stored("not-a-phc-string".to_string());
        assert!(!verify_password("anything", &bogus));
    }

    #[test]
    fn debug_output_is_redacted() {
        let hash = hash_password("hidden").unwrap();
        let printed = format!("{hash:?}");
        assert!(!printed.contains("argon2"));
    }

    #[test]
    fn dummy_hash_parses_and_never_verifies() {
        let parsed = PhcHash::new(DUMMY_HASH).expect("well-formed PHC string");
        assert_eq!(parsed.algorithm.as_str(), "argon2id");
        assert!(!verify_dummy(""));
        assert!(!verify_dummy("password"));
    }
}
