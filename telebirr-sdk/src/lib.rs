//! Wire objects and signing primitives for the Telebirr payment gateway core.
//!
//! This crate performs no I/O. It holds the request/response envelopes of
//! both Telebirr flows, the service and admin API objects, the validated
//! runtime configuration types, and the two signature schemes in use:
//!
//! * [`signing::gateway`]: RSA-SHA256 over canonicalized parameters, shared
//!   by the B2B and C2B flows.
//! * [`signing::service`]: HMAC-SHA256 body signing for the internal service API.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod objects;
pub mod signing;
