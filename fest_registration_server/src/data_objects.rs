use std::{fmt::Display, str::FromStr};

use fest_common::{Paise, CURRENCY_CODE};
use fest_registration_engine::{
    db_types::{OrderId, Payment, Registration, RegistrationStatus, TeamInfo, UserId},
    traits::RegistrationQueryFilter,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub sport_id: i64,
    #[serde(default)]
    pub team: Option<TeamInfo>,
    /// Skip the gateway order for now. The participant can complete the payment later.
    #[serde(default)]
    pub pay_later: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOrderRequest {
    pub registration_id: i64,
}

/// What the checkout widget needs to collect a registration fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOrderResponse {
    pub registration_id: i64,
    pub order_id: OrderId,
    pub amount: Paise,
    pub currency: String,
    /// The public gateway key. `None` when no gateway is configured.
    pub key_id: Option<String>,
    /// True when no gateway order exists yet and the payment has been deferred.
    pub pay_later: bool,
}

impl PaymentOrderResponse {
    pub fn new(registration_id: i64, payment: &Payment, key_id: Option<String>) -> Self {
        Self {
            registration_id,
            order_id: payment.order_id.clone(),
            amount: payment.amount,
            currency: CURRENCY_CODE.to_string(),
            key_id,
            pay_later: payment.order_id.is_placeholder(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub registration: Registration,
    pub order: PaymentOrderResponse,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegistrationOpenUpdate {
    pub open: bool,
}

/// Query parameters for the admin registration search. `status` takes a comma-separated list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationSearchParams {
    pub sport_id: Option<i64>,
    pub user_id: Option<String>,
    pub status: Option<String>,
}

impl TryFrom<RegistrationSearchParams> for RegistrationQueryFilter {
    type Error = String;

    fn try_from(params: RegistrationSearchParams) -> Result<Self, Self::Error> {
        let mut filter = RegistrationQueryFilter::default();
        if let Some(sport_id) = params.sport_id {
            filter = filter.with_sport_id(sport_id);
        }
        if let Some(user_id) = params.user_id {
            filter = filter.with_user_id(UserId::from(user_id));
        }
        for status in params.status.iter().flat_map(|s| s.split(',')).map(str::trim).filter(|s| !s.is_empty()) {
            let status = RegistrationStatus::from_str(status).map_err(|e| e.to_string())?;
            filter = filter.with_status(status);
        }
        Ok(filter)
    }
}
