//! TOML file configuration structures.
//!
//! These structs directly map to the `telebirr-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub service: ServiceConfig,
    pub telebirr: TelebirrConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Admin configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// Shared secret of the restaurant backend calling the service API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub secret: String,
}

/// Telebirr merchant settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelebirrConfig {
    pub app_id: String,
    /// Merchant private key: inline PEM or a path to a PEM file. Inline PEM
    /// may use literal `\n` for line breaks.
    pub merchant_private_key: String,
    /// Telebirr public key, in the same forms.
    pub gateway_public_key: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_timeout_express")]
    pub timeout_express: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub b2b: Option<B2bConfig>,
    pub c2b: Option<C2bConfig>,
}

fn default_request_timeout_secs() -> u64 {
    telebirr_sdk::config::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_timeout_express() -> String {
    telebirr_sdk::config::DEFAULT_TIMEOUT_EXPRESS.to_string()
}

fn default_currency() -> String {
    telebirr_sdk::config::DEFAULT_CURRENCY.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct B2bConfig {
    pub app_secret: String,
    pub token_url: Url,
    pub preorder_url: Url,
    pub web_checkout_url: Url,
    pub notify_url: Url,
    pub return_url: Option<Url>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct C2bConfig {
    pub unified_order_url: Url,
    pub notify_url: Url,
    pub return_url: Option<Url>,
}

/// Retry queue schedule. Every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub jitter_percent: u32,
    pub max_attempts: i32,
    pub poll_interval_secs: u64,
    pub batch_size: i64,
    pub lease_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let defaults = telebirr_sdk::config::RetryConfig::default();
        Self {
            base_delay_secs: defaults.base_delay.as_secs(),
            max_delay_secs: defaults.max_delay.as_secs(),
            jitter_percent: defaults.jitter_percent,
            max_attempts: defaults.max_attempts,
            poll_interval_secs: defaults.poll_interval.as_secs(),
            batch_size: defaults.batch_size,
            lease_secs: defaults.lease.as_secs(),
        }
    }
}

impl FileConfig {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        self.admin.secret.starts_with("$argon2")
    }
}
