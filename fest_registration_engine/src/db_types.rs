//! Data types that are persisted by the registration engine backends.
//!
//! These types are shared by every backend and are also the types returned by the public APIs.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use fest_common::Paise;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

//--------------------------------------        UserId         ---------------------------------------------------------
/// The identifier the identity provider assigns to a user. The engine treats it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct UserId(pub String);

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        OrderId        ---------------------------------------------------------
/// The payment gateway's order identifier. It is unique across all payments and is the idempotency key for every
/// reconciliation entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

pub const PLACEHOLDER_ORDER_PREFIX: &str = "pending_";

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl OrderId {
    /// The order id recorded for a registration whose payment has been deferred ("pay later"). No gateway order
    /// exists for it.
    pub fn placeholder(registration_id: i64) -> Self {
        Self(format!("{PLACEHOLDER_ORDER_PREFIX}{registration_id}"))
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_ORDER_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        Sport        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Sport {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub max_slots: i64,
    pub filled_slots: i64,
    pub fee: Paise,
    pub registration_open: bool,
    pub min_team_size: i64,
    pub max_team_size: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sport {
    pub fn available_slots(&self) -> i64 {
        (self.max_slots - self.filled_slots).max(0)
    }

    pub fn has_capacity(&self) -> bool {
        self.filled_slots < self.max_slots
    }

    pub fn is_team_sport(&self) -> bool {
        self.max_team_size > 1
    }
}

//--------------------------------------        NewSport        ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSport {
    pub slug: String,
    pub name: String,
    pub max_slots: i64,
    pub fee: Paise,
    #[serde(default = "default_true")]
    pub registration_open: bool,
    #[serde(default = "default_team_size")]
    pub min_team_size: i64,
    #[serde(default = "default_team_size")]
    pub max_team_size: i64,
}

fn default_true() -> bool {
    true
}

fn default_team_size() -> i64 {
    1
}

impl NewSport {
    pub fn new<S: Into<String>>(slug: S, name: S, max_slots: i64, fee: Paise) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            max_slots,
            fee,
            registration_open: true,
            min_team_size: 1,
            max_team_size: 1,
        }
    }

    pub fn with_team_size(mut self, min: i64, max: i64) -> Self {
        self.min_team_size = min;
        self.max_team_size = max;
        self
    }

    pub fn closed(mut self) -> Self {
        self.registration_open = false;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.slug.trim().is_empty() || self.name.trim().is_empty() {
            return Err("A sport needs a slug and a name".into());
        }
        if self.max_slots < 0 {
            return Err(format!("max_slots cannot be negative ({})", self.max_slots));
        }
        if self.fee.is_negative() {
            return Err(format!("The fee cannot be negative ({})", self.fee));
        }
        if self.min_team_size < 1 || self.max_team_size < self.min_team_size {
            return Err(format!("Invalid team size range [{}, {}]", self.min_team_size, self.max_team_size));
        }
        Ok(())
    }
}

//--------------------------------------   RegistrationStatus     -----------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    /// The registration holds a slot and is waiting for the payment outcome.
    Pending,
    /// Payment has been received. The registration keeps its slot.
    Confirmed,
    /// The registration was abandoned. It normally gives its slot back, unless a refund was recorded with the slot
    /// kept.
    Cancelled,
    /// The registration is queued for a slot. It does not hold one.
    Waitlisted,
}

impl Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Confirmed => write!(f, "CONFIRMED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Waitlisted => write!(f, "WAITLISTED"),
        }
    }
}

impl FromStr for RegistrationStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "CANCELLED" => Ok(Self::Cancelled),
            "WAITLISTED" => Ok(Self::Waitlisted),
            s => Err(ConversionError(format!("Invalid registration status: {s}"))),
        }
    }
}

//--------------------------------------      TeamMember       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub email: String,
    pub phone: String,
}

//--------------------------------------      Registration       -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Registration {
    pub id: i64,
    pub user_id: UserId,
    pub sport_id: i64,
    pub status: RegistrationStatus,
    pub team_name: Option<String>,
    pub team_members: Option<Json<Vec<TeamMember>>>,
    /// True while the registration occupies one unit of the sport's `filled_slots`. The status alone does not say
    /// this, since a refund may cancel a registration and leave its slot taken.
    pub holds_slot: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      NewRegistration      -----------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub team_name: String,
    pub members: Vec<TeamMember>,
}

#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub user_id: UserId,
    pub sport_id: i64,
    pub team: Option<TeamInfo>,
}

impl NewRegistration {
    pub fn new<U: Into<UserId>>(user_id: U, sport_id: i64) -> Self {
        Self { user_id: user_id.into(), sport_id, team: None }
    }

    pub fn with_team(mut self, team: TeamInfo) -> Self {
        self.team = Some(team);
        self
    }
}

//--------------------------------------     PaymentStatus      --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Waiting for the gateway outcome.
    Pending,
    /// Funds were captured. Replays of the same outcome are no-ops.
    Success,
    /// The payment attempt failed.
    Failed,
    /// Captured funds were returned to the payer.
    Refunded,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Refunded => write!(f, "REFUNDED"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "REFUNDED" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

//--------------------------------------     PaymentMethod      --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Paid online through the payment gateway
    Gateway,
    Cash,
    BankTransfer,
    Upi,
    Other,
}

impl PaymentMethod {
    pub fn is_manual(&self) -> bool {
        !matches!(self, Self::Gateway)
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gateway => write!(f, "GATEWAY"),
            Self::Cash => write!(f, "CASH"),
            Self::BankTransfer => write!(f, "BANK_TRANSFER"),
            Self::Upi => write!(f, "UPI"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GATEWAY" => Ok(Self::Gateway),
            "CASH" => Ok(Self::Cash),
            "BANK_TRANSFER" => Ok(Self::BankTransfer),
            "UPI" => Ok(Self::Upi),
            "OTHER" => Ok(Self::Other),
            s => Err(ConversionError(format!("Invalid payment method: {s}"))),
        }
    }
}

//--------------------------------------        Payment       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub registration_id: i64,
    pub order_id: OrderId,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub amount: Paise,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub confirmed_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_manual(&self) -> bool {
        self.method.is_manual()
    }
}

//--------------------------------------     Audit log types     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    RegistrationCreated,
    PaymentOrderCreated,
    PaymentVerified,
    PaymentSuccess,
    PaymentFailed,
    PaymentRefunded,
    ManualPaymentConfirmed,
    RegistrationCancelled,
    RegistrationExpired,
    SportCreated,
    SportUpdated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEntityType {
    Sport,
    Registration,
    Payment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Failed,
}

/// Who caused a state change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Actor {
    User(UserId),
    Admin(UserId),
    Webhook,
    System,
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Admin(id) => write!(f, "admin:{id}"),
            Self::Webhook => write!(f, "webhook"),
            Self::System => write!(f, "system"),
        }
    }
}

impl FromStr for Actor {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("user", id)) if !id.is_empty() => Ok(Self::User(id.into())),
            Some(("admin", id)) if !id.is_empty() => Ok(Self::Admin(id.into())),
            None if s == "webhook" => Ok(Self::Webhook),
            None if s == "system" => Ok(Self::System),
            _ => Err(ConversionError(format!("Invalid actor: {s}"))),
        }
    }
}

impl TryFrom<String> for Actor {
    type Error = ConversionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Actor> for String {
    fn from(actor: Actor) -> Self {
        actor.to_string()
    }
}

impl Serialize for Actor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Actor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|e: ConversionError| {
            error!("Could not deserialize actor. {e}");
            serde::de::Error::custom(e.to_string())
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub entity_type: AuditEntityType,
    pub entity_id: i64,
    pub actor: Actor,
    pub metadata: serde_json::Value,
    pub outcome: AuditOutcome,
}

impl NewAuditEntry {
    pub fn new(action: AuditAction, entity_type: AuditEntityType, entity_id: i64, actor: Actor) -> Self {
        Self {
            action,
            entity_type,
            entity_id,
            actor,
            metadata: serde_json::Value::Null,
            outcome: AuditOutcome::Success,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn failed(mut self) -> Self {
        self.outcome = AuditOutcome::Failed;
        self
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: AuditAction,
    pub entity_type: AuditEntityType,
    pub entity_id: i64,
    #[sqlx(try_from = "String")]
    pub actor: Actor,
    pub metadata: Json<serde_json::Value>,
    pub outcome: AuditOutcome,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn actor_round_trips_through_its_string_form() {
        let admin = Actor::Admin("ops-7".into());
        assert_eq!(admin.to_string(), "admin:ops-7");
        assert_eq!("admin:ops-7".parse::<Actor>().unwrap(), admin);
        assert_eq!("webhook".parse::<Actor>().unwrap(), Actor::Webhook);
        assert!("user:".parse::<Actor>().is_err());
        assert!("robot:1".parse::<Actor>().is_err());
    }

    #[test]
    fn placeholder_orders() {
        let id = OrderId::placeholder(42);
        assert_eq!(id.as_str(), "pending_42");
        assert!(id.is_placeholder());
        assert!(!OrderId::from("order_NkB3").is_placeholder());
    }

    #[test]
    fn new_sport_validation() {
        let sport = NewSport::new("chess", "Chess", 16, Paise::from_rupees(200));
        assert!(sport.validate().is_ok());
        assert!(NewSport::new("relay", "Relay", 8, Paise::from(100)).with_team_size(4, 2).validate().is_err());
        assert!(NewSport::new("x", "X", -1, Paise::from(0)).validate().is_err());
        assert!(NewSport::new("x", "X", 1, Paise::from(-5)).validate().is_err());
    }

    #[test]
    fn statuses_parse_case_insensitively() {
        assert_eq!("confirmed".parse::<RegistrationStatus>().unwrap(), RegistrationStatus::Confirmed);
        assert_eq!("Refunded".parse::<PaymentStatus>().unwrap(), PaymentStatus::Refunded);
        assert_eq!("bank_transfer".parse::<PaymentMethod>().unwrap(), PaymentMethod::BankTransfer);
        assert!("LOST".parse::<PaymentStatus>().is_err());
    }
}
