use std::time::Duration;

use thiserror::Error;

use crate::{
    db_types::{NewRegistration, NewSport, OrderId, Paise, Payment, Registration, Sport, UserId},
    traits::data_objects::{
        CancelledRegistration,
        ExpiredRegistration,
        ManualPayment,
        PaymentCapture,
        PaymentFailure,
        PaymentTransition,
        RegistrationQueryFilter,
        RegistrationStats,
    },
};

/// This trait defines the storage behaviour the registration engine needs from a backend.
///
/// Every method that changes the status of a registration or payment does so, together with any change to the
/// sport's `filled_slots` counter it implies, inside a single database transaction. Either everything is committed
/// or nothing is.
///
/// Capacity is only ever consumed through a conditional increment that re-checks `filled_slots < max_slots` in the
/// same statement that performs the write. There is no read-modify-write of the counter anywhere.
#[allow(async_fn_in_trait)]
pub trait RegistrationDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    async fn fetch_sport(&self, sport_id: i64) -> Result<Option<Sport>, RegistrationError>;

    async fn fetch_sports(&self) -> Result<Vec<Sport>, RegistrationError>;

    async fn insert_sport(&self, sport: NewSport) -> Result<Sport, RegistrationError>;

    /// Opens or closes registration for a sport. Returns the updated sport, or `SportNotFound`.
    async fn set_registration_open(&self, sport_id: i64, open: bool) -> Result<Sport, RegistrationError>;

    async fn fetch_registration(&self, registration_id: i64) -> Result<Option<Registration>, RegistrationError>;

    async fn fetch_registration_for_user(
        &self,
        user_id: &UserId,
        sport_id: i64,
    ) -> Result<Option<Registration>, RegistrationError>;

    async fn fetch_registrations_for_user(&self, user_id: &UserId) -> Result<Vec<Registration>, RegistrationError>;

    async fn search_registrations(
        &self,
        filter: RegistrationQueryFilter,
    ) -> Result<Vec<Registration>, RegistrationError>;

    async fn fetch_payment_for_registration(
        &self,
        registration_id: i64,
    ) -> Result<Option<Payment>, RegistrationError>;

    async fn fetch_payment_by_order_id(&self, order_id: &OrderId) -> Result<Option<Payment>, RegistrationError>;

    /// Creates a PENDING registration and consumes one slot of its sport, atomically.
    ///
    /// * If the user already holds a registration for the sport, `AlreadyRegistered` is returned.
    /// * If the conditional increment of the sport's slot counter does not apply, the registration row is rolled back
    ///   and `SlotsFull`, `RegistrationClosed` or `SportNotFound` is returned.
    async fn reserve_slot(&self, registration: NewRegistration) -> Result<Registration, RegistrationError>;

    /// Records the gateway order for a PENDING registration. The registration's single payment row is created, or
    /// updated in place (a retry), and left in the PENDING state.
    ///
    /// Refreshes the registration's `updated_at`, so the stale reservation timeout restarts.
    ///
    /// Fails with `RegistrationNotPending` if the registration is not PENDING, or `PaymentAlreadyCompleted` if the
    /// payment has already succeeded or been refunded.
    async fn attach_payment_order(
        &self,
        registration_id: i64,
        order_id: &OrderId,
        amount: Paise,
    ) -> Result<Payment, RegistrationError>;

    /// Moves the payment identified by `capture.order_id` to SUCCESS, and its registration to CONFIRMED.
    ///
    /// * PENDING payments keep the slot that was reserved with the registration.
    /// * FAILED payments (the payer retried after a failed attempt) must re-acquire a slot. If none is available
    ///   the transaction is rolled back and `SlotsFull` is returned.
    /// * A payment that is already SUCCESS is left untouched and `PaymentTransition::Unchanged` is returned.
    /// * REFUNDED payments cannot succeed again (`IllegalPaymentTransition`).
    async fn mark_payment_succeeded(&self, capture: &PaymentCapture) -> Result<PaymentTransition, RegistrationError>;

    /// Moves a PENDING payment to FAILED, its registration to CANCELLED and releases one slot.
    ///
    /// Failures reported for payments that are not PENDING are stale and return `PaymentTransition::Unchanged`.
    async fn mark_payment_failed(&self, failure: &PaymentFailure) -> Result<PaymentTransition, RegistrationError>;

    /// Moves the payment with the given gateway payment id to REFUNDED and its registration to CANCELLED. The slot
    /// is released only if `release_slot` is true.
    ///
    /// Refunds for payments that are already REFUNDED, or that never captured funds (FAILED), return
    /// `PaymentTransition::Unchanged`.
    async fn mark_payment_refunded(
        &self,
        gateway_payment_id: &str,
        release_slot: bool,
    ) -> Result<PaymentTransition, RegistrationError>;

    /// Confirms a registration against an offline payment.
    ///
    /// * CONFIRMED registrations are rejected with `AlreadyConfirmed` and nothing changes.
    /// * PENDING registrations keep their slot.
    /// * CANCELLED or WAITLISTED registrations must acquire a slot first, or `SlotsFull` is returned.
    ///
    /// The registration's payment row is created or overwritten with synthetic `MANUAL_` identifiers and SUCCESS.
    async fn confirm_manual_payment(
        &self,
        payment: &ManualPayment,
        admin: &UserId,
    ) -> Result<PaymentTransition, RegistrationError>;

    /// Deletes a registration and its payment. A slot is released if the registration was holding one.
    async fn delete_registration(&self, registration_id: i64) -> Result<CancelledRegistration, RegistrationError>;

    /// Cancels every PENDING registration that has not been touched for longer than `timeout` and has no successful
    /// payment. Their PENDING payments are marked as FAILED and their slots are released.
    async fn expire_stale_registrations(
        &self,
        timeout: Duration,
    ) -> Result<Vec<ExpiredRegistration>, RegistrationError>;

    async fn fetch_stats(&self) -> Result<RegistrationStats, RegistrationError>;
}

#[derive(Debug, Clone, Error)]
pub enum RegistrationError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Sport {0} does not exist")]
    SportNotFound(i64),
    #[error("Registration for this sport is closed")]
    RegistrationClosed,
    #[error("No slots available for this sport")]
    SlotsFull,
    #[error("You are already registered for this sport")]
    AlreadyRegistered,
    #[error("Registration {0} does not exist")]
    RegistrationNotFound(i64),
    #[error("The requested payment does not exist: {0}")]
    PaymentNotFound(String),
    #[error("Registration {0} is already confirmed")]
    AlreadyConfirmed(i64),
    #[error("Registration {0} is not awaiting payment")]
    RegistrationNotPending(i64),
    #[error("The payment for registration {0} has already been completed")]
    PaymentAlreadyCompleted(i64),
    #[error("Illegal payment status change. {0}")]
    IllegalPaymentTransition(String),
    #[error("Payment verification failed")]
    InvalidSignature,
    #[error("Invalid request. {0}")]
    ValidationError(String),
    #[error("Not allowed. {0}")]
    Forbidden(String),
}

impl From<sqlx::Error> for RegistrationError {
    fn from(e: sqlx::Error) -> Self {
        RegistrationError::DatabaseError(e.to_string())
    }
}
