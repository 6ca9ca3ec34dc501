use actix_web::{http::StatusCode, test::TestRequest};
use fest_common::Paise;
use fest_registration_engine::{
    db_types::{NewRegistration, PaymentStatus, RegistrationStatus, UserId},
    helpers::sign_checkout,
    RegistrationDatabase,
};
use serde_json::{json, Value};

use super::helpers::*;
use crate::{
    errors::ServerError,
    gateway::{GatewayError, GatewayOrder, GatewayOrderRequest, PaymentGateway},
    routes::open_payment_order,
};

fn verify_request(user: &str, order_id: &str, payment_id: &str, signature: &str) -> TestRequest {
    TestRequest::post().uri("/api/payments/verify").insert_header(bearer(&user_token(user))).set_json(json!({
        "razorpay_order_id": order_id,
        "razorpay_payment_id": payment_id,
        "razorpay_signature": signature,
    }))
}

#[actix_web::test]
async fn verified_checkout_confirms_the_registration() {
    let server = TestServer::new().await;
    let sport = server.add_sport("cricket", 11, 500).await;
    let registration = server.reservation_api().reserve(NewRegistration::new("alice", sport.id)).await.unwrap();
    server.attach_order(&registration, "order_A1").await;

    let signature = sign_checkout(TEST_KEY_SECRET, "order_A1", "pay_A1").unwrap();
    let (status, body) = server.call(verify_request("alice", "order_A1", "pay_A1", &signature)).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let transition: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(transition["result"], "applied");
    assert_eq!(transition["registration"]["status"], "CONFIRMED");
    assert_eq!(transition["payment"]["status"], "SUCCESS");

    // A replayed callback changes nothing
    let (status, body) = server.call(verify_request("alice", "order_A1", "pay_A1", &signature)).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let transition: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(transition["result"], "unchanged");
    assert_eq!(server.reservation_api().sport(sport.id).await.unwrap().filled_slots, 1);

    // Confirmed registrations cannot be paid for again
    let req = TestRequest::post()
        .uri("/api/payments/order")
        .insert_header(bearer(&user_token("alice")))
        .set_json(json!({ "registration_id": registration.id }));
    let (status, _) = server.call(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    server.tear_down().await;
}

#[actix_web::test]
async fn bad_checkout_signatures_change_nothing() {
    let server = TestServer::new().await;
    let sport = server.add_sport("cricket", 11, 500).await;
    let registration = server.reservation_api().reserve(NewRegistration::new("alice", sport.id)).await.unwrap();
    server.attach_order(&registration, "order_A1").await;

    let forged = sign_checkout("not the key secret", "order_A1", "pay_A1").unwrap();
    let (status, body) = server.call(verify_request("alice", "order_A1", "pay_A1", &forged)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Payment verification failed"), "was: {body}");

    // A valid signature submitted by someone else is refused too
    let signature = sign_checkout(TEST_KEY_SECRET, "order_A1", "pay_A1").unwrap();
    let (status, _) = server.call(verify_request("bob", "order_A1", "pay_A1", &signature)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let stored = server.db.fetch_registration(registration.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RegistrationStatus::Pending);
    let payment = server.db.fetch_payment_for_registration(registration.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    server.tear_down().await;
}

#[actix_web::test]
async fn webhooks_need_a_valid_signature() {
    let server = TestServer::new().await;
    let sport = server.add_sport("cricket", 11, 500).await;
    let registration = server.reservation_api().reserve(NewRegistration::new("alice", sport.id)).await.unwrap();
    server.attach_order(&registration, "order_W1").await;
    let body = json!({
        "entity": "event",
        "event": "payment.captured",
        "payload": { "payment": { "entity": { "id": "pay_W1", "order_id": "order_W1", "amount": 50000 } } }
    })
    .to_string();

    let unsigned = TestRequest::post()
        .uri("/webhooks/razorpay")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.clone());
    let (status, _) = server.call(unsigned).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let tampered = TestRequest::post()
        .uri("/webhooks/razorpay")
        .insert_header(("X-Razorpay-Signature", "00ff00ff"))
        .set_payload(body.clone());
    let (status, _) = server.call(tampered).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let stored = server.db.fetch_registration(registration.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RegistrationStatus::Pending);

    let (status, response) = server.call(signed_webhook(&body)).await;
    assert_eq!(status, StatusCode::OK, "was: {response}");
    let outcome: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(outcome["status"], "processed");
    assert_eq!(outcome["transition"]["result"], "applied");
    let stored = server.db.fetch_registration(registration.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RegistrationStatus::Confirmed);

    // Redelivery is acknowledged without being applied again
    let (status, response) = server.call(signed_webhook(&body)).await;
    assert_eq!(status, StatusCode::OK);
    let outcome: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(outcome["transition"]["result"], "unchanged");
    server.tear_down().await;
}

#[actix_web::test]
async fn webhooks_that_cannot_apply_are_acknowledged() {
    let server = TestServer::new().await;
    let unknown_order = json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": { "id": "pay_X", "order_id": "order_nobody" } } }
    })
    .to_string();
    let (status, body) = server.call(signed_webhook(&unknown_order)).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["success"], false);

    let ignored = json!({ "event": "order.paid", "payload": {} }).to_string();
    let (status, body) = server.call(signed_webhook(&ignored)).await;
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["status"], "ignored");
    assert_eq!(response["event"], "order.paid");

    let (status, _) = server.call(signed_webhook("this is not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    server.tear_down().await;
}

#[actix_web::test]
async fn failed_payment_webhook_releases_the_slot() {
    let server = TestServer::new().await;
    let sport = server.add_sport("chess", 1, 100).await;
    let registration = server.reservation_api().reserve(NewRegistration::new("alice", sport.id)).await.unwrap();
    server.attach_order(&registration, "order_F1").await;
    let body = json!({
        "event": "payment.failed",
        "payload": { "payment": { "entity": {
            "id": "pay_F1", "order_id": "order_F1", "error_description": "Card declined"
        } } }
    })
    .to_string();
    let (status, response) = server.call(signed_webhook(&body)).await;
    assert_eq!(status, StatusCode::OK, "was: {response}");
    let stored = server.db.fetch_registration(registration.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RegistrationStatus::Cancelled);
    assert_eq!(server.reservation_api().sport(sport.id).await.unwrap().filled_slots, 0);

    // The freed slot can be taken by someone else
    let req = TestRequest::post()
        .uri("/api/registrations")
        .insert_header(bearer(&user_token("bob")))
        .set_json(json!({ "sport_id": sport.id }));
    let (status, _) = server.call(req).await;
    assert_eq!(status, StatusCode::CREATED);
    server.tear_down().await;
}

//----------------------------------------  Payment order creation  ----------------------------------------------
struct StubGateway {
    fail: bool,
}

impl PaymentGateway for StubGateway {
    fn is_configured(&self) -> bool {
        true
    }

    fn key_id(&self) -> Option<String> {
        Some("rzp_test_stub".into())
    }

    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError> {
        if self.fail {
            return Err(GatewayError::RequestError("connection reset".into()));
        }
        Ok(GatewayOrder {
            id: format!("order_{}", request.receipt).into(),
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: Some(request.receipt.clone()),
            status: Some("created".into()),
        })
    }
}

#[actix_web::test]
async fn gateway_orders_are_created_and_reused() {
    let server = TestServer::new().await;
    let sport = server.add_sport("cricket", 11, 500).await;
    let api = server.reservation_api();
    let alice = UserId::from("alice");
    let registration = api.reserve(NewRegistration::new("alice", sport.id)).await.unwrap();
    let gateway = StubGateway { fail: false };

    let order = open_payment_order(&alice, registration.id, false, false, &api, &gateway).await.unwrap();
    assert_eq!(order.order_id.as_str(), format!("order_reg_{}", registration.id));
    assert_eq!(order.amount, Paise::from_rupees(500));
    assert_eq!(order.key_id.as_deref(), Some("rzp_test_stub"));
    assert!(!order.pay_later);

    // The open order is handed back, even if the gateway has since gone down
    let down = StubGateway { fail: true };
    let again = open_payment_order(&alice, registration.id, false, false, &api, &down).await.unwrap();
    assert_eq!(again.order_id, order.order_id);
    server.tear_down().await;
}

#[actix_web::test]
async fn gateway_outages_only_defer_new_registrations() {
    let server = TestServer::new().await;
    let sport = server.add_sport("cricket", 11, 500).await;
    let api = server.reservation_api();
    let alice = UserId::from("alice");
    let registration = api.reserve(NewRegistration::new("alice", sport.id)).await.unwrap();
    let down = StubGateway { fail: true };

    let err = open_payment_order(&alice, registration.id, false, false, &api, &down).await.unwrap_err();
    assert!(matches!(err, ServerError::GatewayError(_)), "was: {err:?}");

    let order = open_payment_order(&alice, registration.id, false, true, &api, &down).await.unwrap();
    assert!(order.pay_later);
    assert_eq!(order.order_id.as_str(), format!("pending_{}", registration.id));
    let stored = server.db.fetch_registration(registration.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RegistrationStatus::Pending);

    // Once the gateway is back, the placeholder is replaced by a real order
    let up = StubGateway { fail: false };
    let order = open_payment_order(&alice, registration.id, false, false, &api, &up).await.unwrap();
    assert!(!order.pay_later);
    let payment = server.db.fetch_payment_for_registration(registration.id).await.unwrap().unwrap();
    assert_eq!(payment.order_id, order.order_id);
    server.tear_down().await;
}
