//! # Payment gateway signatures
//!
//! The payment gateway authenticates the two kinds of payment outcome messages the engine consumes with an
//! HMAC-SHA256, hex-encoded.
//!
//! ## Checkout signature
//!
//! After a successful checkout the gateway redirects the payer back with `(order_id, payment_id, signature)`. The
//! signature is computed with the merchant's *key secret* over
//!
//! ```text
//!    {order_id}|{payment_id}
//! ```
//!
//! ## Webhook signature
//!
//! Webhook deliveries carry the signature in the `X-Razorpay-Signature` header. It is computed with the *webhook
//! secret* over the raw, unparsed request body. The body must therefore be verified before it is deserialized.
//!
//! Verification always compares MACs in constant time (`Mac::verify_slice`).
use hmac::{Hmac, Mac};
use log::trace;
use sha2::Sha256;
use thiserror::Error;

pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Error)]
#[error("Could not compute gateway signature: {0}")]
pub struct GatewaySignatureError(String);

fn keyed_mac(secret: &str) -> Result<HmacSha256, GatewaySignatureError> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| GatewaySignatureError(e.to_string()))
}

fn checkout_message(order_id: &str, payment_id: &str) -> String {
    format!("{order_id}|{payment_id}")
}

/// Calculates the checkout signature the gateway would send for the given order and payment.
pub fn sign_checkout(key_secret: &str, order_id: &str, payment_id: &str) -> Result<String, GatewaySignatureError> {
    let mut mac = keyed_mac(key_secret)?;
    mac.update(checkout_message(order_id, payment_id).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks the checkout signature for `(order_id, payment_id)`. Malformed (non-hex) signatures are rejected.
pub fn verify_checkout_signature(key_secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        trace!("🔐️ Checkout signature for order {order_id} is not valid hex");
        return false;
    };
    let Ok(mut mac) = keyed_mac(key_secret) else {
        return false;
    };
    mac.update(checkout_message(order_id, payment_id).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Calculates the webhook signature for the given raw body.
pub fn sign_webhook_body(webhook_secret: &str, body: &[u8]) -> Result<String, GatewaySignatureError> {
    let mut mac = keyed_mac(webhook_secret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a webhook signature against the raw request body.
pub fn verify_webhook_signature(webhook_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        trace!("🔐️ Webhook signature is not valid hex");
        return false;
    };
    let Ok(mut mac) = keyed_mac(webhook_secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
