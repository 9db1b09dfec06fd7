//! The HTTP seam between the gateway clients and Telebirr.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    pub url: Url,
    pub bearer_token: Option<String>,
    /// `(username, password)` for HTTP basic auth.
    pub basic_auth: Option<(String, String)>,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: String,
}

impl GatewayResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("http client error: {0}")]
    Http(String),
}

/// One request, one response, no retries.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn send(&self, request: GatewayRequest) -> Result<GatewayResponse, TransportError>;
}

/// reqwest-backed transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl GatewayTransport for HttpTransport {
    async fn send(&self, request: GatewayRequest) -> Result<GatewayResponse, TransportError> {
        let mut builder = self.client.post(request.url);
        if let Some(token) = request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some((user, password)) = request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }
        builder = match request.body {
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Form(pairs) => builder.form(&pairs),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(GatewayResponse { status, body })
    }
}

/// A transport that replays canned responses and records what it was sent.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{GatewayRequest, GatewayResponse, GatewayTransport, TransportError};

    #[derive(Default)]
    pub struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<GatewayResponse, TransportError>>>,
        requests: Mutex<Vec<GatewayRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn push_json(&self, status: u16, body: serde_json::Value) {
            self.responses.lock().await.push_back(Ok(GatewayResponse {
                status,
                body: body.to_string(),
            }));
        }

        pub async fn push_error(&self, error: TransportError) {
            self.responses.lock().await.push_back(Err(error));
        }

        pub async fn requests(&self) -> Vec<GatewayRequest> {
            self.requests.lock().await.clone()
        }
    }

    #[async_trait]
    impl GatewayTransport for ScriptedTransport {
        async fn send(&self, request: GatewayRequest) -> Result<GatewayResponse, TransportError> {
            self.requests.lock().await.push(request);
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Http("no scripted response".into())))
        }
    }
}
