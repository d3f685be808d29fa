//! Credential hashing and verification for accounts

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;

use crate::error::TellerError;

lazy_static! {
    /// Hash of a throwaway secret. Verified whenever the looked-up account is
    /// missing, so that response timing does not reveal whether an email is
    /// registered.
    static ref DUMMY_HASH: String =
        hash_secret("<RANDOM_CREDENTIAL_FILLER>").expect("hashing a fixed secret");
}

/// Hash a secret using Argon2id, returning the PHC string.
pub fn hash_secret(secret: &str) -> Result<String, TellerError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TellerError::PersistenceFailure(format!("credential hash: {}", e)))
}

/// Verify a secret against a stored PHC hash. A malformed hash counts as a
/// mismatch.
pub fn verify_secret(secret: &str, credential_hash: &str) -> bool {
    match PasswordHash::new(credential_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Timing-equivalent credential check: exactly one Argon2 verification runs
/// whether or not the account exists. When `credential_hash` is `None` the
/// secret is checked against the dummy hash and the result discarded.
pub fn verify_secret_or_dummy(secret: &str, credential_hash: Option<&str>) -> bool {
    match credential_hash {
        Some(hash) => verify_secret(secret, hash),
        None => {
            let _ = verify_secret(secret, &DUMMY_HASH);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_hashing() {
        let secret = "my_secure_password_123";
        let hash = hash_secret(secret).unwrap();

        assert!(verify_secret(secret, &hash));
        assert!(!verify_secret("wrong_password", &hash));
    }

    #[test]
    fn test_malformed_hash_is_mismatch() {
        assert!(!verify_secret("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_dummy_verification_never_matches() {
        // Even the filler secret itself must not authenticate a missing account.
        assert!(!verify_secret_or_dummy("<RANDOM_CREDENTIAL_FILLER>", None));
        assert!(!verify_secret_or_dummy("whatever", None));
    }

    #[test]
    fn test_verify_against_real_hash() {
        let hash = hash_secret("correct horse").unwrap();
        assert!(verify_secret_or_dummy("correct horse", Some(&hash)));
        assert!(!verify_secret_or_dummy("battery staple", Some(&hash)));
    }
}
