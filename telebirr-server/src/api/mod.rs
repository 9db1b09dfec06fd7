//! HTTP API surfaces: gateway webhooks, the signed service API and the
//! admin API.

pub mod admin;
pub mod extractors;
pub mod service;
pub mod webhook;
