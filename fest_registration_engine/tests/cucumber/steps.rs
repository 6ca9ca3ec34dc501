use cucumber::{then, when};
use fest_registration_engine::{
    db_types::{AuditAction, AuditEntityType, NewRegistration, OrderId, Paise, PaymentMethod, RegistrationStatus, UserId},
    helpers::sign_checkout,
    reconciliation_objects::{GatewayEvent, PaymentVerification},
    traits::{AuditLogFilter, ManualPayment, PaymentCapture, PaymentFailure},
    AuditLog,
    RegistrationError,
};

use crate::cucumber::{registration_world::KEY_SECRET, RegistrationWorld};

fn error_name(e: &RegistrationError) -> &'static str {
    match e {
        RegistrationError::DatabaseError(_) => "DatabaseError",
        RegistrationError::SportNotFound(_) => "SportNotFound",
        RegistrationError::RegistrationClosed => "RegistrationClosed",
        RegistrationError::SlotsFull => "SlotsFull",
        RegistrationError::AlreadyRegistered => "AlreadyRegistered",
        RegistrationError::RegistrationNotFound(_) => "RegistrationNotFound",
        RegistrationError::PaymentNotFound(_) => "PaymentNotFound",
        RegistrationError::AlreadyConfirmed(_) => "AlreadyConfirmed",
        RegistrationError::RegistrationNotPending(_) => "RegistrationNotPending",
        RegistrationError::PaymentAlreadyCompleted(_) => "PaymentAlreadyCompleted",
        RegistrationError::IllegalPaymentTransition(_) => "IllegalPaymentTransition",
        RegistrationError::InvalidSignature => "InvalidSignature",
        RegistrationError::ValidationError(_) => "ValidationError",
        RegistrationError::Forbidden(_) => "Forbidden",
    }
}

fn gateway_payment_id(user: &str, slug: &str) -> String {
    format!("pay_{user}_{slug}")
}

#[when(expr = "{word} registers for {word}")]
async fn register(world: &mut RegistrationWorld, user: String, slug: String) {
    let sport = world.sport(&slug).await;
    let result = world.system().reservations.reserve(NewRegistration::new(user, sport.id)).await;
    world.record(result);
}

#[when(expr = "{word} opens a payment order for {word}")]
async fn open_order(world: &mut RegistrationWorld, user: String, slug: String) {
    let registration = world.registration(&user, &slug).await.expect("No registration to pay for");
    let sport = world.sport(&slug).await;
    let order_id = OrderId::from(format!("order_{user}_{slug}"));
    let result = world
        .system()
        .reservations
        .attach_payment_order(&UserId::from(user), registration.id, order_id, sport.fee)
        .await;
    world.record(result);
}

#[when(expr = "{word} verifies the payment for {word}")]
async fn verify(world: &mut RegistrationWorld, user: String, slug: String) {
    let payment = world.payment(&user, &slug).await;
    let payment_id = gateway_payment_id(&user, &slug);
    let signature = sign_checkout(KEY_SECRET, payment.order_id.as_str(), &payment_id).expect("Error signing");
    let verification = PaymentVerification::new(payment.order_id, payment_id, signature);
    let result = world.system().reconciliation.verify_payment(&UserId::from(user), verification).await;
    world.record(result);
}

#[when(expr = "{word} submits a forged verification for {word}")]
async fn forged_verify(world: &mut RegistrationWorld, user: String, slug: String) {
    let payment = world.payment(&user, &slug).await;
    let verification = PaymentVerification::new(payment.order_id, gateway_payment_id(&user, &slug), "00".repeat(32));
    let result = world.system().reconciliation.verify_payment(&UserId::from(user), verification).await;
    world.record(result);
}

#[when(expr = "the gateway reports {word} for {word} in {word}")]
async fn webhook(world: &mut RegistrationWorld, event: String, user: String, slug: String) {
    let payment = world.payment(&user, &slug).await;
    let gateway_payment_id = gateway_payment_id(&user, &slug);
    let event = match event.as_str() {
        "payment.captured" => GatewayEvent::PaymentCaptured(PaymentCapture {
            order_id: payment.order_id,
            gateway_payment_id,
            signature: None,
        }),
        "payment.failed" => GatewayEvent::PaymentFailed(PaymentFailure {
            order_id: payment.order_id,
            gateway_payment_id: Some(gateway_payment_id),
            reason: Some("Declined".into()),
        }),
        "refund.created" => {
            GatewayEvent::RefundCreated { refund_id: format!("rfnd_{user}_{slug}"), gateway_payment_id }
        },
        other => GatewayEvent::Ignored(other.to_string()),
    };
    let result = world.system().reconciliation.handle_webhook(event).await;
    world.record(result);
}

#[when(expr = "an admin confirms a {word} payment of {int} rupees for {word} in {word}")]
async fn manual_confirm(world: &mut RegistrationWorld, method: String, rupees: i64, user: String, slug: String) {
    let registration = world.registration(&user, &slug).await.expect("No registration to confirm");
    let method = method.parse::<PaymentMethod>().expect("Unknown payment method");
    let payment = ManualPayment {
        registration_id: registration.id,
        amount: Paise::from_rupees(rupees),
        method,
        reference: None,
        notes: None,
    };
    let result = world.system().reconciliation.manual_confirm(payment, &UserId::from("admin")).await;
    world.record(result);
}

#[when(expr = "an admin cancels the registration of {word} for {word}")]
async fn cancel(world: &mut RegistrationWorld, user: String, slug: String) {
    let registration = world.registration(&user, &slug).await.expect("No registration to cancel");
    let result = world.system().admin.cancel_registration(registration.id, &UserId::from("admin")).await;
    world.record(result);
}

#[then(expr = "the last request failed with {word}")]
async fn last_request_failed(world: &mut RegistrationWorld, expected: String) {
    let error = world.last_error.as_ref().expect("The last request succeeded");
    assert_eq!(error_name(error), expected, "Unexpected error: {error}");
}

#[then("the last request succeeded")]
async fn last_request_succeeded(world: &mut RegistrationWorld) {
    assert!(world.last_error.is_none(), "The last request failed: {:?}", world.last_error);
}

#[then(expr = "{word} has a {word} registration for {word}")]
async fn registration_status(world: &mut RegistrationWorld, user: String, status: String, slug: String) {
    let expected = status.parse::<RegistrationStatus>().expect("Unknown registration status");
    let registration = world.registration(&user, &slug).await.expect("Registration does not exist");
    assert_eq!(registration.status, expected, "Registration status is incorrect");
}

#[then(expr = "{word} has no registration for {word}")]
async fn no_registration(world: &mut RegistrationWorld, user: String, slug: String) {
    let registration = world.registration(&user, &slug).await;
    assert!(registration.is_none(), "Unexpected registration: {registration:?}");
}

#[then(expr = "{word} has {int} filled slots")]
async fn filled_slots(world: &mut RegistrationWorld, slug: String, expected: i64) {
    let sport = world.sport(&slug).await;
    assert_eq!(sport.filled_slots, expected, "Filled slots for {slug} is incorrect");
}

#[then(expr = "the payment of {word} for {word} has {int} {word} audit entries")]
async fn audit_entries(world: &mut RegistrationWorld, user: String, slug: String, expected: usize, action: String) {
    let payment = world.payment(&user, &slug).await;
    let action = serde_json::from_value::<AuditAction>(serde_json::Value::String(action)).expect("Unknown action");
    let filter = AuditLogFilter::for_entity(AuditEntityType::Payment, payment.id).with_action(action);
    let entries = world.system().db.fetch_audit_entries(filter).await.expect("Error reading the audit log");
    assert_eq!(entries.len(), expected, "Audit entry count is incorrect");
}
