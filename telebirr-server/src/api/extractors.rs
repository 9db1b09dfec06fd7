//! Request authentication for the two non-gateway surfaces.
//!
//! The restaurant backend calls `/payments/*` with an HMAC over the JSON
//! body ([`SignedBody`]); operators call `/admin/*` with the plaintext admin
//! secret, checked against its argon2 hash ([`AdminAuth`]). Gateway webhooks
//! are authenticated by RSA signature inside the callback processor instead.

use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use telebirr_sdk::signing::service::{
    ADMIN_AUTH_HEADER, SERVICE_SIGNATURE_HEADER, Signature, SignatureError, SignedObject,
};

use crate::state::AppState;

/// Largest accepted service API body.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// A service API body whose `Telebirr-Service-Signature` header checked out.
///
/// The header is `{unix_seconds}.{base64 hmac}` where the HMAC-SHA256 covers
/// `"{unix_seconds}.{raw body}"` under the shared service secret. Stale
/// timestamps are refused. The secret is read per request so a SIGHUP reload
/// takes effect immediately.
pub struct SignedBody<T: Signature>(pub T);

/// Why a service API request was refused before reaching its handler.
#[derive(Debug, thiserror::Error)]
pub enum SignedBodyError {
    #[error("missing Telebirr-Service-Signature header")]
    MissingHeader,
    #[error("invalid Telebirr-Service-Signature header format")]
    InvalidHeader,
    #[error("invalid signature encoding")]
    InvalidBase64,
    #[error("failed to read request body")]
    BodyReadError,
    #[error("invalid JSON body: {0}")]
    JsonError(serde_json::Error),
    #[error("signature verification failed")]
    VerificationFailed,
}

impl From<SignatureError> for SignedBodyError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidFormat => Self::InvalidHeader,
            SignatureError::InvalidBase64 => Self::InvalidBase64,
            SignatureError::Json(e) => Self::JsonError(e),
            SignatureError::SignatureMismatch | SignatureError::Expired => Self::VerificationFailed,
        }
    }
}

impl IntoResponse for SignedBodyError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            SignedBodyError::MissingHeader => (
                StatusCode::UNAUTHORIZED,
                "missing Telebirr-Service-Signature header",
            ),
            SignedBodyError::InvalidHeader => (
                StatusCode::BAD_REQUEST,
                "invalid Telebirr-Service-Signature header format",
            ),
            SignedBodyError::InvalidBase64 => {
                (StatusCode::BAD_REQUEST, "invalid signature encoding")
            }
            SignedBodyError::BodyReadError => {
                (StatusCode::BAD_REQUEST, "failed to read request body")
            }
            SignedBodyError::JsonError(_) => (StatusCode::BAD_REQUEST, "invalid JSON body"),
            SignedBodyError::VerificationFailed => {
                (StatusCode::UNAUTHORIZED, "signature verification failed")
            }
        };
        (status, message).into_response()
    }
}

impl<T: Signature + Send> FromRequest<AppState> for SignedBody<T> {
    type Rejection = SignedBodyError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_value = req
            .headers()
            .get(SERVICE_SIGNATURE_HEADER)
            .ok_or(SignedBodyError::MissingHeader)?
            .to_str()
            .map_err(|_| SignedBodyError::InvalidHeader)?
            .to_owned();

        let body_bytes = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|_| SignedBodyError::BodyReadError)?;

        let json =
            String::from_utf8(body_bytes.to_vec()).map_err(|_| SignedBodyError::BodyReadError)?;

        let signed = SignedObject::<T>::from_header_and_body(&header_value, json)?;

        let service = state.config.service.read().await;
        let verified_body = signed.verify(service.secret_bytes())?;
        drop(service);

        Ok(SignedBody(verified_body))
    }
}

/// Proof that the request carried the admin secret.
pub struct AdminAuth;

#[derive(Debug)]
pub enum AdminAuthError {
    MissingHeader,
    InvalidSecret,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        match self {
            AdminAuthError::MissingHeader => (
                StatusCode::UNAUTHORIZED,
                "missing Telebirr-Admin-Authorization header",
            )
                .into_response(),
            AdminAuthError::InvalidSecret => {
                (StatusCode::UNAUTHORIZED, "invalid admin secret").into_response()
            }
        }
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .ok_or(AdminAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AdminAuthError::InvalidSecret)?
            .to_owned();

        let admin = state.config.admin.read().await.clone();
        let valid = tokio::task::spawn_blocking(move || admin.verify_secret(&secret))
            .await
            .unwrap_or(false);

        if valid {
            Ok(AdminAuth)
        } else {
            tracing::warn!("Rejected admin request with invalid secret");
            Err(AdminAuthError::InvalidSecret)
        }
    }
}
