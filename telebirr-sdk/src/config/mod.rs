//! Validated runtime configuration.
//!
//! Parsing and validation live in the server crate; these types are what the
//! rest of the system consumes.

mod admin;
mod retry;
mod server;
mod service;
mod telebirr;

pub use admin::AdminConfig;
pub use retry::RetryConfig;
pub use server::ServerConfig;
pub use service::ServiceConfig;
pub use telebirr::{
    B2bConfig, C2bConfig, DEFAULT_CURRENCY, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TIMEOUT_EXPRESS,
    TelebirrConfig,
};
