use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use fest_registration_engine::RegistrationError;
use log::error;
use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Payment verification failed")]
    PaymentVerificationFailed,
    #[error("Could not create a payment order. {0}")]
    GatewayError(#[from] GatewayError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::PaymentVerificationFailed => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingToken => StatusCode::UNAUTHORIZED,
                AuthError::ValidationError(_) => StatusCode::UNAUTHORIZED,
                AuthError::PoorlyFormattedToken(_) => StatusCode::BAD_REQUEST,
                AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
                AuthError::InvalidWebhookSignature => StatusCode::BAD_REQUEST,
                AuthError::CouldNotIssueToken(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::GatewayError(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No bearer token was provided.")]
    MissingToken,
    #[error("Access token is invalid. {0}")]
    ValidationError(String),
    #[error("Access token is not in the correct format. {0}")]
    PoorlyFormattedToken(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("Invalid webhook signature.")]
    InvalidWebhookSignature,
    #[error("Could not issue an access token. {0}")]
    CouldNotIssueToken(String),
}

impl From<RegistrationError> for ServerError {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::SlotsFull => Self::Conflict("No slots available for this sport".into()),
            RegistrationError::AlreadyRegistered => Self::Conflict("You are already registered for this sport".into()),
            RegistrationError::RegistrationClosed |
            RegistrationError::AlreadyConfirmed(_) |
            RegistrationError::RegistrationNotPending(_) |
            RegistrationError::PaymentAlreadyCompleted(_) |
            RegistrationError::ValidationError(_) => Self::InvalidRequest(e.to_string()),
            RegistrationError::SportNotFound(_) |
            RegistrationError::RegistrationNotFound(_) |
            RegistrationError::PaymentNotFound(_) => Self::NoRecordFound(e.to_string()),
            RegistrationError::InvalidSignature => Self::PaymentVerificationFailed,
            RegistrationError::Forbidden(s) => Self::InsufficientPermissions(s),
            RegistrationError::DatabaseError(_) | RegistrationError::IllegalPaymentTransition(_) => {
                error!("💻️ Request failed on the backend. {e}");
                Self::BackendError("The request could not be completed. Please try again later.".into())
            },
        }
    }
}
