//! B2B access tokens, cached in memory.

use std::sync::Arc;

use telebirr_sdk::objects::b2b::{GRANT_CLIENT_CREDENTIALS, TokenResponse};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::transport::{GatewayRequest, GatewayTransport, RequestBody};
use super::{GatewayError, truncate_body};
use crate::utils::clock::Clock;

/// Tokens are refreshed this long before they expire.
pub const REFRESH_SKEW: time::Duration = time::Duration::seconds(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: OffsetDateTime,
}

impl AccessToken {
    fn usable_at(&self, now: OffsetDateTime) -> bool {
        now + REFRESH_SKEW < self.expires_at
    }
}

/// Holds at most one token and fetches a new one only when none is usable.
///
/// The lock is held across acquisition, so concurrent callers that all find
/// the cache empty trigger a single client-credentials call.
pub struct TokenCache {
    transport: Arc<dyn GatewayTransport>,
    clock: Arc<dyn Clock>,
    token_url: Url,
    app_id: String,
    app_secret: String,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        clock: Arc<dyn Clock>,
        token_url: Url,
        app_id: String,
        app_secret: String,
    ) -> Self {
        Self {
            transport,
            clock,
            token_url,
            app_id,
            app_secret,
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<AccessToken, GatewayError> {
        let mut cached = self.cached.lock().await;
        let now = self.clock.now();
        if let Some(token) = cached.as_ref().filter(|t| t.usable_at(now)) {
            return Ok(token.clone());
        }

        let fresh = self.acquire(now).await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    /// Forget the cached token, e.g. after the gateway refused it.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn acquire(&self, now: OffsetDateTime) -> Result<AccessToken, GatewayError> {
        debug!(token_url = %self.token_url, "Requesting access token");
        let response = self
            .transport
            .send(GatewayRequest {
                url: self.token_url.clone(),
                bearer_token: None,
                basic_auth: Some((self.app_id.clone(), self.app_secret.clone())),
                body: RequestBody::Form(vec![(
                    "grant_type".to_string(),
                    GRANT_CLIENT_CREDENTIALS.to_string(),
                )]),
            })
            .await
            .map_err(|e| GatewayError::Token(e.to_string()))?;

        if !response.is_success() {
            warn!(status = response.status, "Token endpoint refused credentials");
            return Err(GatewayError::Token(format!(
                "token endpoint answered {}: {}",
                response.status,
                truncate_body(&response.body)
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| GatewayError::Token(format!("unparsable token response: {e}")))?;
        if parsed.access_token.is_empty() || parsed.expires_in <= 0 {
            return Err(GatewayError::Token("token response without a usable token".into()));
        }

        let token = AccessToken {
            access_token: parsed.access_token,
            token_type: parsed.token_type,
            expires_at: now + time::Duration::seconds(parsed.expires_in),
        };
        info!(expires_at = %token.expires_at, "Acquired new access token");
        Ok(token)
    }
}
