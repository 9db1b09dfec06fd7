//! HMAC-SHA256 signing for the internal service API.
//!
//! The restaurant backend calls the payment core with a JSON body and a
//! signature header:
//!
//! ```text
//! Telebirr-Service-Signature: {unix_timestamp}.{base64_signature}
//! signature = HMAC-SHA256("{timestamp}.{json_body}", service_secret)
//! ```

/// Header carrying the service API signature.
pub const SERVICE_SIGNATURE_HEADER: &str = "Telebirr-Service-Signature";

/// Header carrying the plaintext admin secret.
pub const ADMIN_AUTH_HEADER: &str = "Telebirr-Admin-Authorization";

/// Maximum allowed distance between a signature timestamp and now, in seconds.
pub const MAX_SIGNATURE_SKEW: i64 = 5 * 60;

/// Marker for service API bodies that travel inside a [`SignedObject`].
pub trait Signature: for<'de> serde::Deserialize<'de> + serde::Serialize {}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature timestamp outside the accepted window")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

/// A signed request body with its typed payload, timestamp, raw JSON and MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedObject<T: Signature> {
    pub body: T,
    pub timestamp: i64,
    pub json: String,
    pub signature: Box<[u8]>,
}

fn mac(key: &[u8], timestamp: i64, json: &str) -> ring::hmac::Tag {
    let data = format!("{timestamp}.{json}");
    ring::hmac::sign(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        data.as_bytes(),
    )
}

impl<T: Signature> SignedObject<T> {
    /// Serialize and sign `body` with the current time.
    pub fn new(body: T, key: &[u8]) -> Result<Self, serde_json::Error> {
        Self::new_at(body, key, time::OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Serialize and sign `body` with an explicit timestamp.
    pub fn new_at(body: T, key: &[u8], timestamp: i64) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(&body)?;
        let signature = mac(key, timestamp, &json).as_ref().to_vec().into_boxed_slice();
        Ok(Self {
            body,
            timestamp,
            json,
            signature,
        })
    }

    /// Parse the header and body. Does not check the MAC; see [`verify`](Self::verify).
    pub fn from_header_and_body(
        header_value: &str,
        body_json: String,
    ) -> Result<Self, SignatureError> {
        let (timestamp, signature) = parse_signature_header(header_value)?;
        let body: T = serde_json::from_str(&body_json)?;
        Ok(Self {
            body,
            timestamp,
            json: body_json,
            signature,
        })
    }

    /// Check the MAC and timestamp window, returning the authenticated body.
    pub fn verify(self, key: &[u8]) -> Result<T, SignatureError> {
        self.verify_at(key, time::OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn verify_at(self, key: &[u8], now: i64) -> Result<T, SignatureError> {
        let data = format!("{}.{}", self.timestamp, self.json);
        ring::hmac::verify(
            &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
            data.as_bytes(),
            self.signature.as_ref(),
        )?;
        check_timestamp(self.timestamp, now)?;
        Ok(self.body)
    }

    /// Full header value, `{timestamp}.{base64}`.
    pub fn to_header(&self) -> String {
        format_signature_header(self.timestamp, &self.signature)
    }
}

/// Split a `{timestamp}.{base64}` header into its parts.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, signature) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature = fast32::base64::RFC4648_NOPAD
        .decode_str(signature.trim().trim_end_matches('='))
        .map_err(|_| SignatureError::InvalidBase64)?
        .into_boxed_slice();
    Ok((timestamp, signature))
}

pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{}.{}",
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

/// Reject timestamps more than [`MAX_SIGNATURE_SKEW`] seconds away from `now`.
pub fn check_timestamp(timestamp: i64, now: i64) -> Result<(), SignatureError> {
    if (now - timestamp).abs() > MAX_SIGNATURE_SKEW {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Sample {
        correlation_id: String,
    }
    impl Signature for Sample {}

    const KEY: &[u8] = b"service-secret";

    #[test]
    fn test_header_round_trip_verifies() {
        let signed = SignedObject::new_at(
            Sample {
                correlation_id: "PP-1".into(),
            },
            KEY,
            1_700_000_000,
        )
        .unwrap();
        let header = signed.to_header();
        assert!(header.starts_with("1700000000."));

        let parsed = SignedObject::<Sample>::from_header_and_body(&header, signed.json.clone()).unwrap();
        let body = parsed.verify_at(KEY, 1_700_000_010).unwrap();
        assert_eq!(body.correlation_id, "PP-1");
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signed = SignedObject::new_at(
            Sample {
                correlation_id: "PP-1".into(),
            },
            KEY,
            1_700_000_000,
        )
        .unwrap();
        let parsed = SignedObject::<Sample>::from_header_and_body(
            &signed.to_header(),
            r#"{"correlation_id":"PP-2"}"#.to_string(),
        )
        .unwrap();
        assert!(matches!(
            parsed.verify_at(KEY, 1_700_000_000),
            Err(SignatureError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_stale_and_future_timestamps_rejected() {
        let sample = Sample {
            correlation_id: "PP-1".into(),
        };
        let signed = SignedObject::new_at(sample, KEY, 1_700_000_000).unwrap();
        assert!(matches!(
            signed.clone().verify_at(KEY, 1_700_000_000 + MAX_SIGNATURE_SKEW + 1),
            Err(SignatureError::Expired)
        ));
        assert!(matches!(
            signed.verify_at(KEY, 1_700_000_000 - MAX_SIGNATURE_SKEW - 1),
            Err(SignatureError::Expired)
        ));
    }

    #[test]
    fn test_malformed_header() {
        assert!(matches!(
            parse_signature_header("no-dot-here"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            parse_signature_header("abc.AAAA"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            parse_signature_header("1700000000.!!!"),
            Err(SignatureError::InvalidBase64)
        ));
    }
}
