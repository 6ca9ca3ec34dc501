//! Payment gateway order client.
//!
//! Before a participant can pay, the gateway must know about the payment: an order is created for the registration
//! fee and its id is handed to the checkout widget. This module wraps that call behind [`PaymentGateway`]. The
//! Razorpay REST API is the supported backend. When no gateway keys are configured, [`GatewayClient::Offline`] is
//! used and registrations are left with a "pay later" placeholder order.
use std::sync::Arc;

use fest_common::{Paise, Secret, CURRENCY_CODE};
use fest_registration_engine::{db_types::OrderId, registration_objects::PaymentQuote};
use log::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GatewayConfig;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Could not initialize the gateway client. {0}")]
    Initialization(String),
    #[error("No payment gateway is configured")]
    NotConfigured,
    #[error("The gateway could not be reached. {0}")]
    RequestError(String),
    #[error("The gateway rejected the request with status {status}. {message}")]
    Rejected { status: u16, message: String },
    #[error("The gateway response could not be read. {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNotes {
    pub registration_id: i64,
    pub sport_id: i64,
    pub user_id: String,
}

/// The body of the gateway's create-order call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrderRequest {
    pub amount: Paise,
    pub currency: String,
    pub receipt: String,
    pub notes: OrderNotes,
}

impl GatewayOrderRequest {
    pub fn for_quote(quote: &PaymentQuote) -> Self {
        let registration = &quote.registration;
        Self {
            amount: quote.amount(),
            currency: CURRENCY_CODE.to_string(),
            receipt: format!("reg_{}", registration.id),
            notes: OrderNotes {
                registration_id: registration.id,
                sport_id: registration.sport_id,
                user_id: registration.user_id.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: OrderId,
    pub amount: Paise,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    /// True if orders can be created. When false, callers fall back to a placeholder order.
    fn is_configured(&self) -> bool;

    /// The public key the checkout widget is opened with.
    fn key_id(&self) -> Option<String>;

    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError>;
}

//-------------------------------------------------  Razorpay  ---------------------------------------------------------
#[derive(Clone)]
pub struct RazorpayClient {
    api_url: String,
    key_id: String,
    key_secret: Secret<String>,
    client: Arc<Client>,
}

impl RazorpayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Initialization(e.to_string()))?;
        Ok(Self {
            api_url: config.api_url.clone(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            client: Arc::new(client),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }
}

impl PaymentGateway for RazorpayClient {
    fn is_configured(&self) -> bool {
        true
    }

    fn key_id(&self) -> Option<String> {
        Some(self.key_id.clone())
    }

    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let url = self.url("/orders");
        debug!("💳️ Creating gateway order {} for {}", request.receipt, request.amount);
        let response = self
            .client
            .post(url)
            .basic_auth(&self.key_id, Some(self.key_secret.reveal()))
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::RequestError(e.to_string()))?;
        if response.status().is_success() {
            let order =
                response.json::<GatewayOrder>().await.map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
            info!("💳️ Gateway order {} created for {}", order.id, request.receipt);
            Ok(order)
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
            warn!("💳️ Gateway refused order {}. [{status}] {message}", request.receipt);
            Err(GatewayError::Rejected { status, message })
        }
    }
}

//-------------------------------------------------  GatewayClient  ----------------------------------------------------
/// The gateway the server was configured with.
#[derive(Clone)]
pub enum GatewayClient {
    Razorpay(RazorpayClient),
    Offline,
}

impl GatewayClient {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        if config.is_configured() {
            Ok(Self::Razorpay(RazorpayClient::new(config)?))
        } else {
            warn!("💳️ No payment gateway is configured. Registrations will receive 'pay later' orders.");
            Ok(Self::Offline)
        }
    }
}

impl PaymentGateway for GatewayClient {
    fn is_configured(&self) -> bool {
        match self {
            Self::Razorpay(c) => c.is_configured(),
            Self::Offline => false,
        }
    }

    fn key_id(&self) -> Option<String> {
        match self {
            Self::Razorpay(c) => c.key_id(),
            Self::Offline => None,
        }
    }

    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError> {
        match self {
            Self::Razorpay(c) => c.create_order(request).await,
            Self::Offline => Err(GatewayError::NotConfigured),
        }
    }
}
