//! Admin API credentials.

use argon2::{Argon2, PasswordHash, PasswordVerifier};

/// The argon2 hash of the operator secret guarding the admin API.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub secret_hash: String,
}

impl AdminConfig {
    pub fn new(secret_hash: String) -> Self {
        Self { secret_hash }
    }

    /// Check a plaintext secret from the `Telebirr-Admin-Authorization` header.
    ///
    /// A malformed stored hash never matches.
    pub fn verify_secret(&self, plaintext: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(&self.secret_hash) else {
            return false;
        };

        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed_hash)
            .is_ok()
    }
}
