//! Salted password hashing for directory and fallback accounts.

use std::sync::OnceLock;

use anyhow::Result;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::warn;

/// Hash a password into an argon2 PHC string with a fresh random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string. Unparseable hashes never match.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Stored password hash is not a valid PHC string");
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Hash checked when no account matches, generated once per process
fn unknown_account_hash() -> Option<&'static str> {
    static HASH: OnceLock<Option<String>> = OnceLock::new();
    HASH.get_or_init(|| match hash_password("gatekeep-unknown-account") {
        Ok(hash) => Some(hash),
        Err(e) => {
            warn!(error = %e, "Failed to prepare unknown-account hash");
            None
        }
    })
    .as_deref()
}

/// Spend the same argon2 work as a failed [`verify_password`] for an email
/// with no usable account. Always false.
pub fn reject_unknown_account(password: &str) -> bool {
    if let Some(hash) = unknown_account_hash() {
        let _ = verify_password(password, hash);
    }
    false
}
