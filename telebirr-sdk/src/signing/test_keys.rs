//! Fixed 2048-bit RSA key pairs for tests.
//!
//! The merchant pair stands in for the merchant's own key; the gateway pair
//! stands in for Telebirr. Never load these outside of tests.

use super::gateway::{GatewaySigner, KeyError};

pub const MERCHANT_PRIVATE_PEM: &str = include_str!("../../../testdata/merchant_private.pem");
pub const MERCHANT_PRIVATE_PKCS8_PEM: &str =
    include_str!("../../../testdata/merchant_private_pkcs8.pem");
pub const MERCHANT_PUBLIC_PEM: &str = include_str!("../../../testdata/merchant_public.pem");
pub const GATEWAY_PRIVATE_PEM: &str = include_str!("../../../testdata/gateway_private.pem");
pub const GATEWAY_PUBLIC_PEM: &str = include_str!("../../../testdata/gateway_public.pem");

/// Signature of `amount=100.50&out_trade_no=REST_C2B_42_1&subject=Lunch` by the merchant key.
pub const MERCHANT_VECTOR_SIGNATURE: &str = include_str!("../../../testdata/merchant_vector.sig");

/// Our side: signs with the merchant key, verifies with the gateway key.
pub fn merchant_signer() -> Result<GatewaySigner, KeyError> {
    GatewaySigner::from_pem(MERCHANT_PRIVATE_PEM, GATEWAY_PUBLIC_PEM)
}

/// The gateway's side: signs callbacks, verifies our requests.
pub fn gateway_signer() -> Result<GatewaySigner, KeyError> {
    GatewaySigner::from_pem(GATEWAY_PRIVATE_PEM, MERCHANT_PUBLIC_PEM)
}
