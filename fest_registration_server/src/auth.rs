//! Bearer token authentication.
//!
//! Clients authenticate with an `Authorization: Bearer <JWT>` header. Tokens are HS256-signed and carry the user id
//! (`sub`) and the user's roles. Identity issuance happens elsewhere; [`TokenIssuer`] exists so that operators and
//! tests can mint tokens that this server will accept.
use std::{
    fmt::Display,
    future::{ready, Ready},
};

use actix_web::{dev::Payload, http::header, FromRequest, HttpMessage, HttpRequest};
use chrono::Utc;
use fest_registration_engine::db_types::UserId;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub roles: Vec<Role>,
    pub iat: i64,
    pub exp: i64,
}

impl JwtClaims {
    pub fn user_id(&self) -> UserId {
        UserId::from(self.sub.as_str())
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

/// Claims are placed in the request extensions by the JWT middleware, so handlers behind it can simply ask for them.
impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let claims = req.extensions().get::<JwtClaims>().cloned().ok_or_else(|| {
            warn!("🔐️ No JWT claims found in request extensions for {}", req.path());
            ServerError::AuthenticationError(AuthError::MissingToken)
        });
        ready(claims)
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    lifetime: chrono::Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let key = EncodingKey::from_secret(config.jwt_secret.reveal().as_bytes());
        Self { key, lifetime: config.token_lifetime }
    }

    /// Issue a new access token for the given user.
    /// This method DOES NOT check that the user is entitled to the roles. This must be done prior to calling it.
    pub fn issue_token(&self, user_id: &UserId, roles: &[Role]) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user_id.to_string(),
            roles: roles.to_vec(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.key).map_err(|e| {
            error!("🔐️ Could not sign access token for {user_id}. {e}");
            AuthError::CouldNotIssueToken(e.to_string())
        })
    }
}

#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(config: &AuthConfig) -> Self {
        let key = DecodingKey::from_secret(config.jwt_secret.reveal().as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self { key, validation }
    }

    pub fn validate(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation).map_err(|e| {
            debug!("🔐️ Access token rejected. {e}");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidToken |
                jsonwebtoken::errors::ErrorKind::Base64(_) |
                jsonwebtoken::errors::ErrorKind::Json(_) |
                jsonwebtoken::errors::ErrorKind::Utf8(_) => AuthError::PoorlyFormattedToken(e.to_string()),
                _ => AuthError::ValidationError(e.to_string()),
            }
        })?;
        Ok(data.claims)
    }

    /// Extracts and validates the bearer token of a request.
    pub fn validate_request(&self, req: &HttpRequest) -> Result<JwtClaims, AuthError> {
        let token = bearer_token(req)?;
        self.validate(token)
    }
}

fn bearer_token(req: &HttpRequest) -> Result<&str, AuthError> {
    let value = req.headers().get(header::AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let value = value.to_str().map_err(|e| AuthError::PoorlyFormattedToken(e.to_string()))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::PoorlyFormattedToken("Expected a bearer token".into()))
}
