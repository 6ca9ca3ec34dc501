use serde::{Deserialize, Serialize};

use crate::{
    db_types::OrderId,
    traits::{PaymentCapture, PaymentFailure, PaymentTransition, RegistrationError},
};

/// The values the checkout widget hands back to the client after a successful payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVerification {
    #[serde(alias = "razorpay_order_id")]
    pub order_id: OrderId,
    #[serde(alias = "razorpay_payment_id")]
    pub payment_id: String,
    #[serde(alias = "razorpay_signature")]
    pub signature: String,
}

impl PaymentVerification {
    pub fn new<O: Into<OrderId>, S: Into<String>>(order_id: O, payment_id: S, signature: S) -> Self {
        Self { order_id: order_id.into(), payment_id: payment_id.into(), signature: signature.into() }
    }
}

impl From<PaymentVerification> for PaymentCapture {
    fn from(v: PaymentVerification) -> Self {
        PaymentCapture { order_id: v.order_id, gateway_payment_id: v.payment_id, signature: Some(v.signature) }
    }
}

//--------------------------------------   Webhook deliveries   -------------------------------------------------------

pub const PAYMENT_CAPTURED: &str = "payment.captured";
pub const PAYMENT_FAILED: &str = "payment.failed";
pub const REFUND_CREATED: &str = "refund.created";

/// The envelope of a gateway webhook delivery. Only the fields used for reconciliation are modelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub payment: Option<EntityWrapper<PaymentEntity>>,
    #[serde(default)]
    pub refund: Option<EntityWrapper<RefundEntity>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityWrapper<T> {
    pub entity: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundEntity {
    pub id: String,
    pub payment_id: String,
    #[serde(default)]
    pub amount: Option<i64>,
}

/// A webhook delivery, reduced to the reconciliation step it asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    PaymentCaptured(PaymentCapture),
    PaymentFailed(PaymentFailure),
    RefundCreated { refund_id: String, gateway_payment_id: String },
    /// An event type that reconciliation does not act on. It is acknowledged so the gateway stops retrying.
    Ignored(String),
}

impl GatewayEvent {
    pub fn name(&self) -> &str {
        match self {
            GatewayEvent::PaymentCaptured(_) => PAYMENT_CAPTURED,
            GatewayEvent::PaymentFailed(_) => PAYMENT_FAILED,
            GatewayEvent::RefundCreated { .. } => REFUND_CREATED,
            GatewayEvent::Ignored(name) => name.as_str(),
        }
    }

    pub fn from_body(body: &[u8]) -> Result<Self, RegistrationError> {
        let envelope = serde_json::from_slice::<WebhookEnvelope>(body)
            .map_err(|e| RegistrationError::ValidationError(format!("Malformed webhook body. {e}")))?;
        Self::try_from(envelope)
    }
}

fn payment_entity(envelope: WebhookEnvelope) -> Result<(PaymentEntity, OrderId), RegistrationError> {
    let event = envelope.event;
    let entity = envelope
        .payload
        .payment
        .map(|p| p.entity)
        .ok_or_else(|| RegistrationError::ValidationError(format!("{event} event has no payment entity")))?;
    let order_id = entity
        .order_id
        .clone()
        .map(OrderId::from)
        .ok_or_else(|| RegistrationError::ValidationError(format!("{event} payment {} has no order id", entity.id)))?;
    Ok((entity, order_id))
}

impl TryFrom<WebhookEnvelope> for GatewayEvent {
    type Error = RegistrationError;

    fn try_from(envelope: WebhookEnvelope) -> Result<Self, Self::Error> {
        match envelope.event.as_str() {
            PAYMENT_CAPTURED => {
                let (entity, order_id) = payment_entity(envelope)?;
                Ok(GatewayEvent::PaymentCaptured(PaymentCapture {
                    order_id,
                    gateway_payment_id: entity.id,
                    signature: entity.signature,
                }))
            },
            PAYMENT_FAILED => {
                let (entity, order_id) = payment_entity(envelope)?;
                Ok(GatewayEvent::PaymentFailed(PaymentFailure {
                    order_id,
                    gateway_payment_id: Some(entity.id),
                    reason: entity.error_description.or(entity.error_code),
                }))
            },
            REFUND_CREATED => {
                let refund = envelope.payload.refund.map(|r| r.entity).ok_or_else(|| {
                    RegistrationError::ValidationError("refund.created event has no refund entity".into())
                })?;
                Ok(GatewayEvent::RefundCreated { refund_id: refund.id, gateway_payment_id: refund.payment_id })
            },
            _ => Ok(GatewayEvent::Ignored(envelope.event)),
        }
    }
}

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed { transition: Box<PaymentTransition> },
    Ignored { event: String },
}
