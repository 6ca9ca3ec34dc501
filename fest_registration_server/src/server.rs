use std::time::Duration;

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use fest_common::Secret;
use fest_registration_engine::{
    events::EventProducers,
    helpers::WEBHOOK_SIGNATURE_HEADER,
    AdminApi,
    ReconciliationApi,
    ReservationApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    auth::{TokenIssuer, TokenValidator},
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    event_hooks::create_event_handlers,
    expiry_worker::start_expiry_worker,
    gateway::GatewayClient,
    helpers::get_remote_ip,
    middleware::{HmacMiddlewareFactory, JwtMiddlewareFactory},
    routes::{
        health,
        AuditLogRoute,
        CancelRegistrationRoute,
        CreateSportRoute,
        ManualConfirmRoute,
        MyRegistrationsRoute,
        PaymentOrderRoute,
        RazorpayWebhookRoute,
        RegisterRoute,
        RegistrationByIdRoute,
        SearchRegistrationsRoute,
        SetRegistrationOpenRoute,
        SportByIdRoute,
        SportsRoute,
        StatsRoute,
        VerifyPaymentRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = create_event_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;
    if let Some(timeout) = config.pending_registration_timeout {
        let _handle = start_expiry_worker(db.clone(), producers.clone(), timeout);
    }
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let gateway =
        GatewayClient::from_config(&config.gateway).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let reservation_api = ReservationApi::new(db.clone(), db.clone());
        let reconciliation_api =
            ReconciliationApi::new(db.clone(), db.clone(), producers.clone(), config.gateway.key_secret.clone())
                .with_refund_slot_release(config.release_slot_on_refund);
        let admin_api = AdminApi::new(db.clone(), db.clone(), producers.clone());
        let jwt_signer = TokenIssuer::new(&config.auth);
        let validator = TokenValidator::new(&config.auth);
        let options = ServerOptions::from_config(&config);
        let webhook_secret = config.gateway.webhook_secret.clone();
        let hmac_checks = config.gateway.hmac_checks;
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("frs::access_log"))
            .app_data(web::Data::new(reservation_api))
            .app_data(web::Data::new(reconciliation_api))
            .app_data(web::Data::new(admin_api))
            .app_data(web::Data::new(gateway.clone()))
            .app_data(web::Data::new(jwt_signer))
            .app_data(web::Data::new(options))
            .configure(move |cfg| configure_routes(cfg, validator, webhook_secret, hmac_checks, options))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// Registers every route of the server. The APIs, the gateway client and the server options must have been added to
/// the app data beforehand.
pub fn configure_routes(
    cfg: &mut web::ServiceConfig,
    validator: TokenValidator,
    webhook_secret: Secret<String>,
    hmac_checks: bool,
    options: ServerOptions,
) {
    // Routes that require authentication
    let auth_scope = web::scope("/api")
        .wrap(JwtMiddlewareFactory::new(validator))
        .service(RegisterRoute::<SqliteDatabase, SqliteDatabase>::new())
        .service(MyRegistrationsRoute::<SqliteDatabase, SqliteDatabase>::new())
        .service(RegistrationByIdRoute::<SqliteDatabase, SqliteDatabase>::new())
        .service(PaymentOrderRoute::<SqliteDatabase, SqliteDatabase>::new())
        .service(VerifyPaymentRoute::<SqliteDatabase, SqliteDatabase>::new())
        .service(ManualConfirmRoute::<SqliteDatabase, SqliteDatabase>::new())
        .service(CancelRegistrationRoute::<SqliteDatabase, SqliteDatabase>::new())
        .service(SearchRegistrationsRoute::<SqliteDatabase, SqliteDatabase>::new())
        .service(CreateSportRoute::<SqliteDatabase, SqliteDatabase>::new())
        .service(SetRegistrationOpenRoute::<SqliteDatabase, SqliteDatabase>::new())
        .service(StatsRoute::<SqliteDatabase, SqliteDatabase>::new())
        .service(AuditLogRoute::<SqliteDatabase, SqliteDatabase>::new());
    let webhook_scope = web::scope("/webhooks")
        .wrap(HmacMiddlewareFactory::new(WEBHOOK_SIGNATURE_HEADER, webhook_secret, hmac_checks))
        .wrap_fn(move |req, srv| {
            let peer = get_remote_ip(req.request(), options.use_x_forwarded_for, options.use_forwarded);
            match peer {
                Some(ip) => info!("💻️ Webhook delivery from {ip}"),
                None => warn!("💻️ Webhook delivery from an unknown address"),
            }
            srv.call(req)
        })
        .service(RazorpayWebhookRoute::<SqliteDatabase, SqliteDatabase>::new());
    cfg.service(health)
        .service(SportsRoute::<SqliteDatabase, SqliteDatabase>::new())
        .service(SportByIdRoute::<SqliteDatabase, SqliteDatabase>::new())
        .service(auth_scope)
        .service(webhook_scope);
}
