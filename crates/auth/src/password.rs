//! Password hashing (Argon2id, PHC strings) and the password strength policy.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand_core::OsRng;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),

    #[error("stored password hash is invalid: {0}")]
    InvalidHash(String),
}

/// Hash a plaintext password with Argon2id and a random salt.
pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Check a plaintext password against a stored PHC hash.
///
/// A mismatch is `Ok(false)`; only a corrupt stored hash is an error.
pub fn verify_password(plain: &str, stored: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;
    Ok(Argon2::default().verify_password(plain.as_bytes(), &parsed).is_ok())
}

/// Strength rules applied to new passwords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_letters: bool,
    pub require_mixed_case: bool,
    pub require_numbers: bool,
    pub require_symbols: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_letters: true,
            require_mixed_case: true,
            require_numbers: true,
            require_symbols: true,
        }
    }
}

impl PasswordPolicy {
    /// Returns one message per violated rule; empty means acceptable.
    pub fn check(&self, password: &str) -> Vec<String> {
        let mut errors = Vec::new();

        if password.chars().count() < self.min_length {
            errors.push(format!("The password must be at least {} characters.", self.min_length));
        }
        if self.require_letters && !password.chars().any(char::is_alphabetic) {
            errors.push("The password must contain at least one letter.".to_string());
        }
        if self.require_mixed_case
            && !(password.chars().any(char::is_uppercase) && password.chars().any(char::is_lowercase))
        {
            errors.push("The password must contain at least one uppercase and one lowercase letter.".to_string());
        }
        if self.require_numbers && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push("The password must contain at least one number.".to_string());
        }
        if self.require_symbols && !password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace()) {
            errors.push("The password must contain at least one symbol.".to_string());
        }

        errors
    }
}
