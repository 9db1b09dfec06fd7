//! Configuration module for telebirr-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles admin secret hashing and
//! loading the RSA key pair.

pub mod file;

use crate::config::file::{FileConfig, RetryConfig as FileRetryConfig, TelebirrConfig as FileTelebirrConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use telebirr_sdk::config::{
    AdminConfig, B2bConfig, C2bConfig, RetryConfig, ServerConfig, ServiceConfig, TelebirrConfig,
};
use telebirr_sdk::signing::{GatewaySigner, KeyError};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid key material: {0}")]
    Key(#[from] KeyError),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub service: ServiceConfig,
    pub telebirr: TelebirrConfig,
    pub retry: RetryConfig,
    pub signer: GatewaySigner,
}

/// The configuration sections that can be swapped at runtime (SIGHUP).
#[derive(Clone)]
pub struct SharedConfig {
    pub admin: Arc<RwLock<AdminConfig>>,
    pub service: Arc<RwLock<ServiceConfig>>,
}

impl SharedConfig {
    pub fn new(admin: AdminConfig, service: ServiceConfig) -> Self {
        Self {
            admin: Arc::new(RwLock::new(admin)),
            service: Arc::new(RwLock::new(service)),
        }
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the admin secret if it's plaintext (and rewrite the file)
    /// 5. Parse both RSA keys
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        self.validate(&file_config)?;

        let secret_hash = if file_config.is_admin_secret_hashed() {
            file_config.admin.secret.clone()
        } else {
            let hash = self.hash_secret(&file_config.admin.secret)?;
            file_config.admin.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            hash
        };

        let base_dir = self.config_path.parent().unwrap_or(Path::new("."));
        let signer = GatewaySigner::from_pem(
            &read_pem(&file_config.telebirr.merchant_private_key, base_dir)?,
            &read_pem(&file_config.telebirr.gateway_public_key, base_dir)?,
        )?;

        Ok(LoadedConfig {
            server: ServerConfig {
                listen: file_config.server.listen,
            },
            admin: AdminConfig::new(secret_hash),
            service: ServiceConfig::new(file_config.service.secret.into_bytes()),
            telebirr: convert_telebirr(file_config.telebirr),
            retry: convert_retry(&file_config.retry),
            signer,
        })
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let telebirr = &config.telebirr;
        if telebirr.app_id.trim().is_empty() {
            return Err(ConfigError::ValidationError("telebirr.app_id is empty".into()));
        }
        if telebirr.b2b.is_none() && telebirr.c2b.is_none() {
            return Err(ConfigError::ValidationError(
                "at least one of [telebirr.b2b] or [telebirr.c2b] must be configured".into(),
            ));
        }
        if let Some(b2b) = &telebirr.b2b
            && b2b.app_secret.is_empty()
        {
            return Err(ConfigError::ValidationError("telebirr.b2b.app_secret is empty".into()));
        }
        if telebirr.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "telebirr.request_timeout_secs must be positive".into(),
            ));
        }
        if config.service.secret.is_empty() {
            return Err(ConfigError::ValidationError("service.secret is empty".into()));
        }
        let retry = &config.retry;
        if retry.max_attempts < 1 || retry.batch_size < 1 || retry.base_delay_secs == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts, retry.batch_size and retry.base_delay_secs must be positive".into(),
            ));
        }
        if retry.max_delay_secs < retry.base_delay_secs {
            return Err(ConfigError::ValidationError(
                "retry.max_delay_secs is below retry.base_delay_secs".into(),
            ));
        }
        Ok(())
    }

    fn hash_secret(&self, plaintext: &str) -> Result<String, ConfigError> {
        use argon2::{
            Argon2, PasswordHasher,
            password_hash::{SaltString, rand_core::OsRng},
        };

        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ConfigError::HashError(e.to_string()))
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

/// Inline PEM (literal `\n` allowed) or a path relative to the config file.
fn read_pem(value: &str, base_dir: &Path) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.starts_with("-----BEGIN") {
        return Ok(trimmed.replace("\\n", "\n"));
    }
    let path = base_dir.join(trimmed);
    std::fs::read_to_string(&path).map_err(|source| ConfigError::KeyFile { path, source })
}

fn convert_telebirr(t: FileTelebirrConfig) -> TelebirrConfig {
    TelebirrConfig {
        app_id: t.app_id,
        request_timeout: Duration::from_secs(t.request_timeout_secs),
        timeout_express: t.timeout_express,
        currency: t.currency,
        b2b: t.b2b.map(|b| B2bConfig {
            app_secret: b.app_secret,
            token_url: b.token_url,
            preorder_url: b.preorder_url,
            web_checkout_url: b.web_checkout_url,
            notify_url: b.notify_url,
            return_url: b.return_url,
        }),
        c2b: t.c2b.map(|c| C2bConfig {
            unified_order_url: c.unified_order_url,
            notify_url: c.notify_url,
            return_url: c.return_url,
        }),
    }
}

fn convert_retry(r: &FileRetryConfig) -> RetryConfig {
    RetryConfig {
        base_delay: Duration::from_secs(r.base_delay_secs),
        max_delay: Duration::from_secs(r.max_delay_secs),
        jitter_percent: r.jitter_percent,
        max_attempts: r.max_attempts,
        poll_interval: Duration::from_secs(r.poll_interval_secs.max(1)),
        batch_size: r.batch_size,
        lease: Duration::from_secs(r.lease_secs.max(1)),
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
