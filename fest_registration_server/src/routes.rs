//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate function. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Each worker thread processes its requests sequentially, so a handler that blocks the thread stalls every request
//! queued on that worker. All I/O here (database, gateway calls) is async and must stay that way.
use actix_web::{get, web, HttpResponse, Responder};
use fest_registration_engine::{
    db_types::{NewRegistration, NewSport, PaymentStatus, UserId},
    reconciliation_objects::{GatewayEvent, PaymentVerification},
    traits::{AuditLog, AuditLogFilter, ManualPayment, RegistrationDatabase, RegistrationError, RegistrationQueryFilter},
    AdminApi,
    ReconciliationApi,
    ReservationApi,
};
use log::*;

use crate::{
    auth::{JwtClaims, Role},
    data_objects::{
        JsonResponse,
        PaymentOrderRequest,
        PaymentOrderResponse,
        RegistrationOpenUpdate,
        RegistrationRequest,
        RegistrationResponse,
        RegistrationSearchParams,
    },
    errors::ServerError,
    gateway::{GatewayClient, GatewayOrderRequest, PaymentGateway},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:expr),*]) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Sports  ----------------------------------------------------
route!(sports => Get "/sports" impl RegistrationDatabase, AuditLog);
pub async fn sports<B, L>(api: web::Data<ReservationApi<B, L>>) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    trace!("💻️ GET sports");
    let sports = api.sports().await?;
    Ok(HttpResponse::Ok().json(sports))
}

route!(sport_by_id => Get "/sports/{id}" impl RegistrationDatabase, AuditLog);
pub async fn sport_by_id<B, L>(
    path: web::Path<i64>,
    api: web::Data<ReservationApi<B, L>>,
) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    let sport_id = path.into_inner();
    trace!("💻️ GET sport #{sport_id}");
    let sport = api.sport(sport_id).await?;
    Ok(HttpResponse::Ok().json(sport))
}

//----------------------------------------------   Registrations  ----------------------------------------------------
route!(register => Post "/registrations" impl RegistrationDatabase, AuditLog);
/// Route handler for new registrations
///
/// Reserves a slot in the requested sport for the authenticated user and opens the payment order for it. If the
/// user asks to pay later, or the gateway is unavailable, the registration is still created and keeps its slot. A
/// "pay later" placeholder order is recorded instead, and the user completes the payment through
/// `/api/payments/order`.
///
/// Capacity conflicts are reported with 409 Conflict.
pub async fn register<B, L>(
    claims: JwtClaims,
    body: web::Json<RegistrationRequest>,
    api: web::Data<ReservationApi<B, L>>,
    gateway: web::Data<GatewayClient>,
) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    let user = claims.user_id();
    let RegistrationRequest { sport_id, team, pay_later } = body.into_inner();
    debug!("💻️ POST registration for {user} in sport #{sport_id}");
    let mut request = NewRegistration::new(user.clone(), sport_id);
    if let Some(team) = team {
        request = request.with_team(team);
    }
    let registration = api.reserve(request).await?;
    let order = open_payment_order(&user, registration.id, pay_later, true, api.get_ref(), gateway.get_ref()).await?;
    Ok(HttpResponse::Created().json(RegistrationResponse { registration, order }))
}

route!(my_registrations => Get "/registrations" impl RegistrationDatabase, AuditLog);
pub async fn my_registrations<B, L>(
    claims: JwtClaims,
    api: web::Data<ReservationApi<B, L>>,
) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    let user = claims.user_id();
    debug!("💻️ GET registrations for {user}");
    let registrations = api.registrations_for_user(&user).await?;
    Ok(HttpResponse::Ok().json(registrations))
}

route!(registration_by_id => Get "/registrations/{id}" impl RegistrationDatabase, AuditLog);
/// Returns a registration and its payment. Users can only see their own registrations. Admins can see any.
pub async fn registration_by_id<B, L>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<ReservationApi<B, L>>,
) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    let registration_id = path.into_inner();
    debug!("💻️ GET registration #{registration_id} for {}", claims.sub);
    let detail = api.registration(registration_id).await?;
    if detail.registration.user_id.as_str() != claims.sub && !claims.is_admin() {
        return Err(ServerError::InsufficientPermissions("This registration does not belong to you".into()));
    }
    Ok(HttpResponse::Ok().json(detail))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(payment_order => Post "/payments/order" impl RegistrationDatabase, AuditLog);
/// Creates (or returns the open) gateway order for a PENDING registration. This is how "pay later" registrations are
/// completed, and how a payment is retried after the checkout was abandoned.
pub async fn payment_order<B, L>(
    claims: JwtClaims,
    body: web::Json<PaymentOrderRequest>,
    api: web::Data<ReservationApi<B, L>>,
    gateway: web::Data<GatewayClient>,
) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    let user = claims.user_id();
    let registration_id = body.registration_id;
    debug!("💻️ POST payment order for registration #{registration_id} by {user}");
    let order = open_payment_order(&user, registration_id, false, false, api.get_ref(), gateway.get_ref()).await?;
    Ok(HttpResponse::Ok().json(order))
}

/// Returns the payment order a registration should be paid against, creating one if necessary.
///
/// An existing, unpaid gateway order is reused. Otherwise a new gateway order is created, unless `defer` is set or no
/// gateway is configured, in which case the "pay later" placeholder is recorded. When the gateway call fails and
/// `fallback_on_error` is set, the placeholder is recorded too, so that the reservation survives the outage.
pub(crate) async fn open_payment_order<B, L, G>(
    user: &UserId,
    registration_id: i64,
    defer: bool,
    fallback_on_error: bool,
    api: &ReservationApi<B, L>,
    gateway: &G,
) -> Result<PaymentOrderResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
    G: PaymentGateway,
{
    let quote = api.payment_quote(user, registration_id).await?;
    if let Some(payment) = quote.open_gateway_order() {
        debug!("💻️ Registration #{registration_id} already has open order {}", payment.order_id);
        return Ok(PaymentOrderResponse::new(registration_id, payment, gateway.key_id()));
    }
    let order_id = if defer || !gateway.is_configured() {
        let existing = quote
            .payment
            .as_ref()
            .filter(|p| p.status == PaymentStatus::Pending && p.order_id.is_placeholder());
        if let Some(payment) = existing {
            return Ok(PaymentOrderResponse::new(registration_id, payment, gateway.key_id()));
        }
        quote.placeholder_order_id()
    } else {
        match gateway.create_order(&GatewayOrderRequest::for_quote(&quote)).await {
            Ok(order) => order.id,
            Err(e) if fallback_on_error => {
                warn!("💻️ Could not open a gateway order for registration #{registration_id}. {e}. Deferring payment.");
                quote.placeholder_order_id()
            },
            Err(e) => return Err(e.into()),
        }
    };
    let payment = api.attach_payment_order(user, registration_id, order_id, quote.amount()).await?;
    Ok(PaymentOrderResponse::new(registration_id, &payment, gateway.key_id()))
}

route!(verify_payment => Post "/payments/verify" impl RegistrationDatabase, AuditLog);
/// Route handler for the checkout callback
///
/// After a successful checkout, the client posts the order id, payment id and signature that the gateway returned.
/// A valid signature confirms the registration. Verifying the same payment again is harmless and returns
/// `unchanged`.
pub async fn verify_payment<B, L>(
    claims: JwtClaims,
    body: web::Json<PaymentVerification>,
    api: web::Data<ReconciliationApi<B, L>>,
) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    let user = claims.user_id();
    let verification = body.into_inner();
    debug!("💻️ POST verify payment for order {} by {user}", verification.order_id);
    let transition = api.verify_payment(&user, verification).await?;
    Ok(HttpResponse::Ok().json(transition))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(razorpay_webhook => Post "/razorpay" impl RegistrationDatabase, AuditLog);
/// Route handler for gateway webhook deliveries.
///
/// The signature has already been checked by the HMAC middleware when this handler runs. Deliveries are
/// acknowledged with 200 whenever retrying cannot change the result (unknown events, unknown orders, outcomes that
/// were already applied or could not be applied). Only storage failures return an error, so that the gateway
/// retries the delivery.
pub async fn razorpay_webhook<B, L>(
    body: web::Bytes,
    api: web::Data<ReconciliationApi<B, L>>,
) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    let event = GatewayEvent::from_body(body.as_ref()).map_err(|e| {
        warn!("💻️ Could not read webhook delivery. {e}");
        ServerError::InvalidRequestBody(e.to_string())
    })?;
    let name = event.name().to_string();
    info!("💻️ Received '{name}' webhook");
    match api.handle_webhook(event).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(outcome)),
        Err(e @ RegistrationError::DatabaseError(_)) => {
            error!("💻️ Could not process '{name}' webhook. The gateway will retry. {e}");
            Err(e.into())
        },
        Err(e) => {
            warn!("💻️ '{name}' webhook was not applied. {e}");
            Ok(HttpResponse::Ok().json(JsonResponse::failure(e)))
        },
    }
}

//----------------------------------------------   Admin  ----------------------------------------------------
route!(manual_confirm => Post "/admin/payments/manual" impl RegistrationDatabase, AuditLog where requires [Role::Admin]);
pub async fn manual_confirm<B, L>(
    claims: JwtClaims,
    body: web::Json<ManualPayment>,
    api: web::Data<ReconciliationApi<B, L>>,
) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    let admin = claims.user_id();
    let payment = body.into_inner();
    info!("💻️ POST manual {} payment for registration #{} by {admin}", payment.method, payment.registration_id);
    let transition = api.manual_confirm(payment, &admin).await?;
    Ok(HttpResponse::Ok().json(transition))
}

route!(cancel_registration => Delete "/admin/registrations/{id}" impl RegistrationDatabase, AuditLog where requires [Role::Admin]);
pub async fn cancel_registration<B, L>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<AdminApi<B, L>>,
) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    let admin = claims.user_id();
    let registration_id = path.into_inner();
    info!("💻️ DELETE registration #{registration_id} by {admin}");
    let cancelled = api.cancel_registration(registration_id, &admin).await?;
    Ok(HttpResponse::Ok().json(cancelled))
}

route!(search_registrations => Get "/admin/registrations" impl RegistrationDatabase, AuditLog where requires [Role::Admin]);
pub async fn search_registrations<B, L>(
    query: web::Query<RegistrationSearchParams>,
    api: web::Data<AdminApi<B, L>>,
) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    let filter = RegistrationQueryFilter::try_from(query.into_inner()).map_err(ServerError::InvalidRequest)?;
    debug!("💻️ GET registration search: {filter:?}");
    let registrations = api.search_registrations(filter).await?;
    Ok(HttpResponse::Ok().json(registrations))
}

route!(create_sport => Post "/admin/sports" impl RegistrationDatabase, AuditLog where requires [Role::Admin]);
pub async fn create_sport<B, L>(
    claims: JwtClaims,
    body: web::Json<NewSport>,
    api: web::Data<AdminApi<B, L>>,
) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    let sport = api.create_sport(body.into_inner(), &claims.user_id()).await?;
    Ok(HttpResponse::Created().json(sport))
}

route!(set_registration_open => Patch "/admin/sports/{id}/registration" impl RegistrationDatabase, AuditLog where requires [Role::Admin]);
pub async fn set_registration_open<B, L>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<RegistrationOpenUpdate>,
    api: web::Data<AdminApi<B, L>>,
) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    let sport = api.set_registration_open(path.into_inner(), body.open, &claims.user_id()).await?;
    Ok(HttpResponse::Ok().json(sport))
}

route!(stats => Get "/admin/stats" impl RegistrationDatabase, AuditLog where requires [Role::Admin]);
pub async fn stats<B, L>(api: web::Data<AdminApi<B, L>>) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    trace!("💻️ GET stats");
    let stats = api.stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}

route!(audit_log => Get "/admin/audit" impl RegistrationDatabase, AuditLog where requires [Role::Admin]);
/// Audit entries, newest first. Filter with `entity_type`, `entity_id`, `action` and `limit` query parameters.
pub async fn audit_log<B, L>(
    query: web::Query<AuditLogFilter>,
    api: web::Data<AdminApi<B, L>>,
) -> Result<HttpResponse, ServerError>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    let filter = query.into_inner();
    debug!("💻️ GET audit log: {filter:?}");
    let entries = api.audit_entries(filter).await?;
    Ok(HttpResponse::Ok().json(entries))
}
