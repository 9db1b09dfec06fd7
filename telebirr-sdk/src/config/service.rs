//! Credentials of the internal service API caller.

/// Shared HMAC secret of the restaurant backend calling the service API.
#[derive(Clone)]
pub struct ServiceConfig {
    secret: Box<[u8]>,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig").finish_non_exhaustive()
    }
}

impl ServiceConfig {
    pub fn new(secret: impl Into<Box<[u8]>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }
}
