use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db_types::{
    AuditAction,
    AuditEntityType,
    OrderId,
    Paise,
    Payment,
    PaymentMethod,
    PaymentStatus,
    Registration,
    RegistrationStatus,
    UserId,
};

/// The outcome of the Capacity Ledger's conditional increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    CapacityExceeded,
    RegistrationClosed,
    SportNotFound,
}

/// What a transition did to the sport's capacity counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotChange {
    /// The slot acquired at reservation time is kept.
    Retained,
    /// One slot was given back to the sport.
    Released,
    /// The registration had lost its slot and took a new one.
    Reacquired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedTransition {
    pub payment: Payment,
    pub registration: Registration,
    /// `None` when the payment row was created by the transition.
    pub previous_payment_status: Option<PaymentStatus>,
    pub previous_registration_status: RegistrationStatus,
    pub slot: SlotChange,
}

/// Result of applying a payment outcome.
///
/// `Unchanged` is returned when the outcome was already applied (a replay) or is stale. Callers must not repeat any
/// side effect (audit entries, events) for `Unchanged`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PaymentTransition {
    Applied(AppliedTransition),
    Unchanged { payment: Payment, registration: Registration },
}

impl PaymentTransition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn payment(&self) -> &Payment {
        match self {
            Self::Applied(t) => &t.payment,
            Self::Unchanged { payment, .. } => payment,
        }
    }

    pub fn registration(&self) -> &Registration {
        match self {
            Self::Applied(t) => &t.registration,
            Self::Unchanged { registration, .. } => registration,
        }
    }
}

/// A successful checkout or capture reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCapture {
    pub order_id: OrderId,
    pub gateway_payment_id: String,
    pub signature: Option<String>,
}

/// A failed payment attempt reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailure {
    pub order_id: OrderId,
    pub gateway_payment_id: Option<String>,
    pub reason: Option<String>,
}

/// An offline payment recorded by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualPayment {
    pub registration_id: i64,
    pub amount: Paise,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The rows removed by an administrative cancellation, kept so the caller can record what used to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelledRegistration {
    pub registration: Registration,
    pub payment: Option<Payment>,
    pub slot_released: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredRegistration {
    pub registration: Registration,
    pub payment: Option<Payment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationQueryFilter {
    pub sport_id: Option<i64>,
    pub user_id: Option<UserId>,
    pub statuses: Option<Vec<RegistrationStatus>>,
}

impl RegistrationQueryFilter {
    pub fn with_sport_id(mut self, sport_id: i64) -> Self {
        self.sport_id = Some(sport_id);
        self
    }

    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_status(mut self, status: RegistrationStatus) -> Self {
        self.statuses.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sport_id.is_none() && self.user_id.is_none() && self.statuses.as_ref().map_or(true, |s| s.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLogFilter {
    pub entity_type: Option<AuditEntityType>,
    pub entity_id: Option<i64>,
    pub action: Option<AuditAction>,
    pub limit: Option<i64>,
}

impl AuditLogFilter {
    pub fn for_entity(entity_type: AuditEntityType, entity_id: i64) -> Self {
        Self { entity_type: Some(entity_type), entity_id: Some(entity_id), ..Default::default() }
    }

    pub fn with_action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SportSummary {
    pub id: i64,
    pub name: String,
    pub max_slots: i64,
    pub filled_slots: i64,
    pub confirmed: i64,
    pub pending: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistrationStats {
    pub total_registrations: i64,
    pub pending: i64,
    pub confirmed: i64,
    pub cancelled: i64,
    pub waitlisted: i64,
    pub revenue: Paise,
    pub sports: Vec<SportSummary>,
}
