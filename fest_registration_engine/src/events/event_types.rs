use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Actor, Payment, Registration},
    traits::SlotChange,
};

/// A registration moved to CONFIRMED because its payment succeeded (via checkout verification, webhook or manual
/// confirmation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationConfirmedEvent {
    pub registration: Registration,
    pub payment: Payment,
    pub actor: Actor,
}

impl RegistrationConfirmedEvent {
    pub fn new(registration: Registration, payment: Payment, actor: Actor) -> Self {
        Self { registration, payment, actor }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnulmentReason {
    PaymentFailed,
    PaymentRefunded,
    CancelledByAdmin,
    Expired,
}

/// A registration stopped being a live claim on its sport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationAnnulledEvent {
    pub registration: Registration,
    pub reason: AnnulmentReason,
    pub slot_released: bool,
}

impl RegistrationAnnulledEvent {
    pub fn new(registration: Registration, reason: AnnulmentReason, slot: SlotChange) -> Self {
        Self { registration, reason, slot_released: slot == SlotChange::Released }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    RegistrationConfirmed(RegistrationConfirmedEvent),
    RegistrationAnnulled(RegistrationAnnulledEvent),
}
