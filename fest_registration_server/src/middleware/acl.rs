//! Access control list middleware for the festival registration server.
//! This middleware can be placed on any route or service behind the JWT middleware.
//!
//! It reads the claims that the JWT middleware stored in the request and checks them against the required roles for
//! the route. If the user has every required role, the request continues. Otherwise, a 403 Forbidden response is
//! returned.

use std::{pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
    HttpMessage,
};
use futures::{
    future::{ok, Ready},
    Future,
};
use log::*;

use crate::{
    auth::{JwtClaims, Role},
    errors::{AuthError, ServerError},
};

pub struct AclMiddlewareFactory {
    required_roles: Vec<Role>,
}

impl AclMiddlewareFactory {
    pub fn new(required_roles: &[Role]) -> Self {
        AclMiddlewareFactory { required_roles: required_roles.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = AclMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { required_roles: self.required_roles.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    required_roles: Vec<Role>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let required_roles = self.required_roles.clone();
        Box::pin(async move {
            let jwt_claims = req.extensions().get::<JwtClaims>().cloned().ok_or_else(|| {
                warn!("🔐️ No JWT claims found in request extensions");
                ServerError::AuthenticationError(AuthError::MissingToken)
            })?;
            if required_roles.iter().all(|role| jwt_claims.roles.contains(role)) {
                service.call(req).await
            } else {
                debug!("🔐️ {} lacks one of {required_roles:?} for {}", jwt_claims.sub, req.path());
                Err(ServerError::AuthenticationError(AuthError::InsufficientPermissions(
                    "Insufficient permissions.".into(),
                ))
                .into())
            }
        })
    }
}
