pub mod gateway;
pub mod service;

#[cfg(any(test, feature = "test-keys"))]
pub mod test_keys;

pub use gateway::{GatewaySigner, KeyError, SigningError, canonical_string};
pub use service::{Signature, SignatureError, SignedObject};
