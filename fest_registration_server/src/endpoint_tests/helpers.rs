use actix_web::{
    body::to_bytes,
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    App,
};
use fest_common::{Paise, Secret};
use fest_registration_engine::{
    db_types::{NewSport, OrderId, Payment, Registration, Sport, UserId},
    events::EventProducers,
    helpers::sign_webhook_body,
    test_utils::prepare_env::{drop_database, prepare_test_env, random_db_path},
    AdminApi,
    ReconciliationApi,
    ReservationApi,
    SqliteDatabase,
};
use log::debug;

use crate::{
    auth::{Role, TokenIssuer, TokenValidator},
    config::{AuthConfig, ServerOptions},
    gateway::GatewayClient,
    server::configure_routes,
};

// Test secrets. DO NOT re-use these anywhere.
pub const TEST_JWT_SECRET: &str = "2d0c6b8f4e1a9d7c3b5f0e8a6c4d2b1f9e7a5c3d1b0f8e6a4c2d0b9f7e5a3c1d";
pub const TEST_KEY_SECRET: &str = "rzp_test_secret_5a9c1e";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_7f3b2d";
pub const ADMIN: &str = "organiser";

pub fn get_auth_config() -> AuthConfig {
    AuthConfig::new(TEST_JWT_SECRET)
}

pub fn issue_token(user: &str, roles: &[Role]) -> String {
    let issuer = TokenIssuer::new(&get_auth_config());
    issuer.issue_token(&UserId::from(user), roles).expect("Failed to sign token")
}

pub fn user_token(user: &str) -> String {
    issue_token(user, &[Role::User])
}

pub fn admin_token() -> String {
    issue_token(ADMIN, &[Role::User, Role::Admin])
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

/// A server backed by a freshly migrated database. The gateway is offline, so every registration receives a
/// "pay later" order unless a test attaches a gateway order itself.
pub struct TestServer {
    pub db: SqliteDatabase,
    url: String,
}

impl TestServer {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error connecting to test database");
        Self { db, url }
    }

    pub fn reservation_api(&self) -> ReservationApi<SqliteDatabase, SqliteDatabase> {
        ReservationApi::new(self.db.clone(), self.db.clone())
    }

    pub fn admin_api(&self) -> AdminApi<SqliteDatabase, SqliteDatabase> {
        AdminApi::new(self.db.clone(), self.db.clone(), EventProducers::default())
    }

    pub async fn add_sport(&self, slug: &str, max_slots: i64, fee_rupees: i64) -> Sport {
        let sport = NewSport::new(slug, slug, max_slots, Paise::from_rupees(fee_rupees));
        self.admin_api().create_sport(sport, &UserId::from(ADMIN)).await.expect("Error creating sport")
    }

    /// Replaces the placeholder order of a registration with a gateway order, as the checkout flow would.
    pub async fn attach_order(&self, registration: &Registration, order_id: &str) -> Payment {
        let api = self.reservation_api();
        let quote = api.payment_quote(&registration.user_id, registration.id).await.expect("Error fetching quote");
        api.attach_payment_order(&registration.user_id, registration.id, OrderId::from(order_id), quote.amount())
            .await
            .expect("Error attaching order")
    }

    /// Sends the request through the full route configuration and returns the status and body. Errors raised by
    /// middleware are rendered the same way the HTTP server would render them.
    pub async fn call(&self, req: TestRequest) -> (StatusCode, String) {
        let reconciliation_api = ReconciliationApi::new(
            self.db.clone(),
            self.db.clone(),
            EventProducers::default(),
            Secret::new(TEST_KEY_SECRET.to_string()),
        );
        let validator = TokenValidator::new(&get_auth_config());
        let options = ServerOptions::default();
        let app = App::new()
            .app_data(web::Data::new(self.reservation_api()))
            .app_data(web::Data::new(reconciliation_api))
            .app_data(web::Data::new(self.admin_api()))
            .app_data(web::Data::new(GatewayClient::Offline))
            .app_data(web::Data::new(options))
            .configure(move |cfg| {
                configure_routes(cfg, validator, Secret::new(TEST_WEBHOOK_SECRET.to_string()), true, options)
            });
        let service = test::init_service(app).await;
        let (status, body) = match test::try_call_service(&service, req.to_request()).await {
            Ok(res) => {
                let status = res.status();
                (status, test::read_body(res).await)
            },
            Err(e) => {
                let res = e.error_response();
                let status = res.status();
                (status, to_bytes(res.into_body()).await.unwrap())
            },
        };
        let body = String::from_utf8_lossy(&body).into_owned();
        debug!("Response: {status} {body}");
        (status, body)
    }

    pub async fn tear_down(mut self) {
        self.db.close().await.expect("Error closing database");
        drop_database(&self.url).await;
    }
}

pub fn signed_webhook(body: &str) -> TestRequest {
    let signature = sign_webhook_body(TEST_WEBHOOK_SECRET, body.as_bytes()).expect("Error signing webhook");
    TestRequest::post()
        .uri("/webhooks/razorpay")
        .insert_header(("X-Razorpay-Signature", signature))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.to_string())
}
