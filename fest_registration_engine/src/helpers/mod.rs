mod gateway_signature;

pub use gateway_signature::{
    sign_checkout,
    sign_webhook_body,
    verify_checkout_signature,
    verify_webhook_signature,
    GatewaySignatureError,
    WEBHOOK_SIGNATURE_HEADER,
};
