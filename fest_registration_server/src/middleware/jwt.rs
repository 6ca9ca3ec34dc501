//! Bearer token middleware.
//!
//! Wrap any scope whose routes need an authenticated user with this middleware. The `Authorization: Bearer` token is
//! validated with the server's [`TokenValidator`] and the resulting [`crate::auth::JwtClaims`] are stored in the
//! request extensions, where the [`super::AclMiddlewareFactory`] and the `JwtClaims` extractor find them.
//!
//! Requests without a valid token are rejected with 401 Unauthorized (or 400 for malformed tokens) before they reach
//! a handler.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
    HttpMessage,
};
use futures::future::LocalBoxFuture;
use log::*;

use crate::{auth::TokenValidator, errors::ServerError};

pub struct JwtMiddlewareFactory {
    validator: TokenValidator,
}

impl JwtMiddlewareFactory {
    pub fn new(validator: TokenValidator) -> Self {
        JwtMiddlewareFactory { validator }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = JwtMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtMiddlewareService { validator: self.validator.clone(), service: Rc::new(service) }))
    }
}

pub struct JwtMiddlewareService<S> {
    validator: TokenValidator,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let claims = self.validator.validate_request(req.request());
        Box::pin(async move {
            match claims {
                Ok(claims) => {
                    trace!("🔐️ Authenticated {} for {}", claims.sub, req.path());
                    req.extensions_mut().insert(claims);
                    service.call(req).await
                },
                Err(e) => {
                    debug!("🔐️ Unauthenticated request to {}. {e}", req.path());
                    Err(ServerError::AuthenticationError(e).into())
                },
            }
        })
    }
}
