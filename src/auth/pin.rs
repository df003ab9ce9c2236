//! One-way PIN hashing
//!
//! PINs are stored as Argon2id PHC strings and only ever compared through
//! `verify_pin`.

use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

use crate::error::OrchestrationError;
use crate::Result;

/// Hash a PIN with Argon2id and a random salt.
pub fn hash_pin(pin: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| OrchestrationError::DatabaseError(format!("Failed to hash PIN: {e}")))
}

/// Verify a PIN against a stored hash. An unparseable hash never verifies.
pub fn verify_pin(pin: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(pin.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// PINs are 4 to 6 ASCII digits.
pub fn is_valid_pin_format(pin: &str) -> bool {
    (4..=6).contains(&pin.len()) && pin.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_pin("1234").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_pin("1234", &hash));
        assert!(!verify_pin("4321", &hash));
    }

    #[test]
    fn test_garbage_hash_never_verifies() {
        assert!(!verify_pin("1234", "1234"));
        assert!(!verify_pin("1234", ""));
    }

    #[test]
    fn test_pin_format() {
        assert!(is_valid_pin_format("0000"));
        assert!(is_valid_pin_format("123456"));
        assert!(!is_valid_pin_format("123"));
        assert!(!is_valid_pin_format("12a4"));
        assert!(!is_valid_pin_format("1234567"));
    }
}
