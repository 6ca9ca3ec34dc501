use std::fmt::Debug;

use fest_common::Secret;
use log::*;
use serde_json::json;

use crate::{
    db_types::{Actor, AuditAction, AuditEntityType, NewAuditEntry, OrderId, UserId},
    events::{AnnulmentReason, EventProducers, RegistrationAnnulledEvent, RegistrationConfirmedEvent},
    fest_api::{
        audit_trail::{merge_metadata, transition_metadata, AuditTrail},
        reconciliation_objects::{GatewayEvent, PaymentVerification, WebhookOutcome},
    },
    helpers::verify_checkout_signature,
    traits::{
        AppliedTransition,
        AuditLog,
        ManualPayment,
        PaymentCapture,
        PaymentFailure,
        PaymentTransition,
        RegistrationDatabase,
        RegistrationError,
    },
};

/// `ReconciliationApi` applies payment outcomes to registrations.
///
/// There are three entry points, and they all converge on the same guarded transitions in the database backend:
/// * [`Self::verify_payment`] is called by the payer's client straight after checkout,
/// * [`Self::handle_webhook`] is called for every (authenticated) gateway webhook delivery,
/// * [`Self::manual_confirm`] is called by an administrator to record an offline payment.
///
/// All three are idempotent. Replays of an outcome that has already been applied produce
/// [`PaymentTransition::Unchanged`], and neither write an audit entry nor notify the event hooks.
pub struct ReconciliationApi<B, L> {
    db: B,
    audit: AuditTrail<L>,
    producers: EventProducers,
    key_secret: Secret<String>,
    release_slot_on_refund: bool,
}

impl<B, L> Debug for ReconciliationApi<B, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi(release_slot_on_refund: {})", self.release_slot_on_refund)
    }
}

impl<B, L> ReconciliationApi<B, L>
where L: AuditLog
{
    /// `key_secret` is the gateway API secret. It signs the checkout `(order_id, payment_id)` pairs.
    pub fn new(db: B, audit_log: L, producers: EventProducers, key_secret: Secret<String>) -> Self {
        Self { db, audit: AuditTrail::new(audit_log), producers, key_secret, release_slot_on_refund: false }
    }

    /// Whether refunded registrations give their slot back to the sport. Off by default.
    pub fn with_refund_slot_release(mut self, release: bool) -> Self {
        self.release_slot_on_refund = release;
        self
    }
}

impl<B, L> ReconciliationApi<B, L>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    /// Confirms the payment described by a checkout callback, on behalf of `user`.
    ///
    /// The signature is checked before anything else is looked at. An invalid signature changes nothing and is
    /// reported as [`RegistrationError::InvalidSignature`] without further detail.
    pub async fn verify_payment(
        &self,
        user: &UserId,
        verification: PaymentVerification,
    ) -> Result<PaymentTransition, RegistrationError> {
        let order_id = verification.order_id.clone();
        if !verify_checkout_signature(
            self.key_secret.reveal(),
            order_id.as_str(),
            &verification.payment_id,
            &verification.signature,
        ) {
            warn!("🔄️🔏️ Checkout signature for order {order_id} submitted by {user} is invalid");
            return Err(RegistrationError::InvalidSignature);
        }
        let payment = self
            .db
            .fetch_payment_by_order_id(&order_id)
            .await?
            .ok_or_else(|| RegistrationError::PaymentNotFound(order_id.to_string()))?;
        let registration = self
            .db
            .fetch_registration(payment.registration_id)
            .await?
            .ok_or(RegistrationError::RegistrationNotFound(payment.registration_id))?;
        if &registration.user_id != user {
            warn!("🔄️🔏️ {user} tried to verify order {order_id}, which belongs to {}", registration.user_id);
            return Err(RegistrationError::Forbidden("This payment does not belong to you".into()));
        }
        let capture = PaymentCapture::from(verification);
        let result = self.db.mark_payment_succeeded(&capture).await;
        self.record_capture(result, &order_id, AuditAction::PaymentVerified, Actor::User(user.clone())).await
    }

    /// Applies an authenticated webhook delivery. Event types that reconciliation does not act on are acknowledged
    /// and ignored.
    pub async fn handle_webhook(&self, event: GatewayEvent) -> Result<WebhookOutcome, RegistrationError> {
        let transition = match event {
            GatewayEvent::PaymentCaptured(capture) => {
                let result = self.db.mark_payment_succeeded(&capture).await;
                self.record_capture(result, &capture.order_id, AuditAction::PaymentSuccess, Actor::Webhook).await?
            },
            GatewayEvent::PaymentFailed(failure) => self.apply_failure(&failure).await?,
            GatewayEvent::RefundCreated { refund_id, gateway_payment_id } => {
                self.apply_refund(&refund_id, &gateway_payment_id).await?
            },
            GatewayEvent::Ignored(event) => {
                debug!("🔄️🪝️ Ignoring webhook event '{event}'");
                return Ok(WebhookOutcome::Ignored { event });
            },
        };
        Ok(WebhookOutcome::Processed { transition: Box::new(transition) })
    }

    /// Confirms a registration against an offline payment recorded by `admin`.
    pub async fn manual_confirm(
        &self,
        payment: ManualPayment,
        admin: &UserId,
    ) -> Result<PaymentTransition, RegistrationError> {
        if !payment.method.is_manual() {
            return Err(RegistrationError::ValidationError(format!(
                "{} is not an offline payment method",
                payment.method
            )));
        }
        if payment.amount.is_negative() {
            return Err(RegistrationError::ValidationError(format!("Invalid amount: {}", payment.amount)));
        }
        let registration_id = payment.registration_id;
        let actor = Actor::Admin(admin.clone());
        let transition = match self.db.confirm_manual_payment(&payment, admin).await {
            Ok(t) => t,
            Err(e @ (RegistrationError::SlotsFull | RegistrationError::RegistrationClosed)) => {
                warn!("🔄️🧾️ {admin} could not confirm registration #{registration_id}. {e}");
                let entry = NewAuditEntry::new(
                    AuditAction::ManualPaymentConfirmed,
                    AuditEntityType::Registration,
                    registration_id,
                    actor,
                )
                .with_metadata(json!({ "method": payment.method, "amount": payment.amount, "error": e.to_string() }))
                .failed();
                self.audit.record(entry).await;
                return Err(e);
            },
            Err(e) => return Err(e),
        };
        if let PaymentTransition::Applied(t) = &transition {
            info!(
                "🔄️🧾️ Registration #{registration_id} confirmed by {admin} against a {} payment of {}",
                payment.method, payment.amount
            );
            let metadata = merge_metadata(
                transition_metadata(t),
                json!({ "reference": payment.reference, "notes": payment.notes, "confirmed_by": admin }),
            );
            let entry = NewAuditEntry::new(
                AuditAction::ManualPaymentConfirmed,
                AuditEntityType::Payment,
                t.payment.id,
                actor.clone(),
            )
            .with_metadata(metadata);
            self.audit.record(entry).await;
            self.notify_confirmed(t, actor).await;
        }
        Ok(transition)
    }

    async fn record_capture(
        &self,
        result: Result<PaymentTransition, RegistrationError>,
        order_id: &OrderId,
        action: AuditAction,
        actor: Actor,
    ) -> Result<PaymentTransition, RegistrationError> {
        match &result {
            Ok(PaymentTransition::Applied(t)) => {
                info!(
                    "🔄️✅️ Order {order_id} paid ({}). Registration #{} is confirmed",
                    t.payment.amount, t.registration.id
                );
                let entry = NewAuditEntry::new(action, AuditEntityType::Payment, t.payment.id, actor.clone())
                    .with_metadata(transition_metadata(t));
                self.audit.record(entry).await;
                self.notify_confirmed(t, actor).await;
            },
            Ok(PaymentTransition::Unchanged { payment, .. }) => {
                debug!("🔄️✅️ Order {order_id} is already {}. Nothing to do", payment.status);
            },
            Err(e @ (RegistrationError::SlotsFull | RegistrationError::RegistrationClosed)) => {
                // A retried payment arrived after its slot was released and taken by someone else
                warn!("🔄️✅️ Order {order_id} was paid, but its registration could not get a slot back. {e}");
                if let Ok(Some(payment)) = self.db.fetch_payment_by_order_id(order_id).await {
                    let entry = NewAuditEntry::new(action, AuditEntityType::Payment, payment.id, actor)
                        .with_metadata(json!({
                            "registration_id": payment.registration_id,
                            "order_id": order_id,
                            "payment_status": payment.status,
                            "error": e.to_string(),
                        }))
                        .failed();
                    self.audit.record(entry).await;
                }
            },
            Err(e) => debug!("🔄️✅️ Could not apply the payment for order {order_id}. {e}"),
        }
        result
    }

    async fn apply_failure(&self, failure: &PaymentFailure) -> Result<PaymentTransition, RegistrationError> {
        let order_id = &failure.order_id;
        let transition = self.db.mark_payment_failed(failure).await?;
        match &transition {
            PaymentTransition::Applied(t) => {
                info!(
                    "🔄️❌️ Order {order_id} failed. Registration #{} is cancelled ({:?})",
                    t.registration.id, t.slot
                );
                let metadata = merge_metadata(transition_metadata(t), json!({ "reason": failure.reason }));
                let entry =
                    NewAuditEntry::new(AuditAction::PaymentFailed, AuditEntityType::Payment, t.payment.id, Actor::Webhook)
                        .with_metadata(metadata);
                self.audit.record(entry).await;
                self.notify_annulled(t, AnnulmentReason::PaymentFailed).await;
            },
            PaymentTransition::Unchanged { payment, .. } => {
                info!("🔄️❌️ Stale failure for order {order_id} ignored. The payment is {}", payment.status);
            },
        }
        Ok(transition)
    }

    async fn apply_refund(
        &self,
        refund_id: &str,
        gateway_payment_id: &str,
    ) -> Result<PaymentTransition, RegistrationError> {
        let transition = self.db.mark_payment_refunded(gateway_payment_id, self.release_slot_on_refund).await?;
        match &transition {
            PaymentTransition::Applied(t) => {
                info!(
                    "🔄️💸️ Payment {gateway_payment_id} refunded ({refund_id}). Registration #{} is cancelled ({:?})",
                    t.registration.id, t.slot
                );
                let metadata = merge_metadata(transition_metadata(t), json!({ "refund_id": refund_id }));
                let entry = NewAuditEntry::new(
                    AuditAction::PaymentRefunded,
                    AuditEntityType::Payment,
                    t.payment.id,
                    Actor::Webhook,
                )
                .with_metadata(metadata);
                self.audit.record(entry).await;
                self.notify_annulled(t, AnnulmentReason::PaymentRefunded).await;
            },
            PaymentTransition::Unchanged { payment, .. } => {
                debug!("🔄️💸️ Refund {refund_id} ignored. Payment {gateway_payment_id} is {}", payment.status);
            },
        }
        Ok(transition)
    }

    async fn notify_confirmed(&self, t: &AppliedTransition, actor: Actor) {
        let event = RegistrationConfirmedEvent::new(t.registration.clone(), t.payment.clone(), actor);
        self.producers.publish_registration_confirmed(event).await;
    }

    async fn notify_annulled(&self, t: &AppliedTransition, reason: AnnulmentReason) {
        let event = RegistrationAnnulledEvent::new(t.registration.clone(), reason, t.slot);
        self.producers.publish_registration_annulled(event).await;
    }
}
