use std::fmt::Debug;

use log::*;
use serde_json::json;

use crate::{
    db_types::{
        Actor,
        AuditAction,
        AuditEntityType,
        NewAuditEntry,
        NewRegistration,
        OrderId,
        Paise,
        Payment,
        PaymentStatus,
        Registration,
        RegistrationStatus,
        Sport,
        UserId,
    },
    fest_api::{
        audit_trail::AuditTrail,
        registration_objects::{validate_team, PaymentQuote, RegistrationDetail},
    },
    traits::{AuditLog, RegistrationDatabase, RegistrationError},
};

/// `ReservationApi` turns registration requests into capacity-bounded claims on a sport, and records the gateway
/// orders that are opened against them.
pub struct ReservationApi<B, L> {
    db: B,
    audit: AuditTrail<L>,
}

impl<B, L> Debug for ReservationApi<B, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReservationApi")
    }
}

impl<B, L> ReservationApi<B, L>
where L: AuditLog
{
    pub fn new(db: B, audit_log: L) -> Self {
        Self { db, audit: AuditTrail::new(audit_log) }
    }
}

impl<B, L> ReservationApi<B, L>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    pub async fn sports(&self) -> Result<Vec<Sport>, RegistrationError> {
        self.db.fetch_sports().await
    }

    pub async fn sport(&self, sport_id: i64) -> Result<Sport, RegistrationError> {
        self.db.fetch_sport(sport_id).await?.ok_or(RegistrationError::SportNotFound(sport_id))
    }

    /// Reserves a slot in a sport for a user.
    ///
    /// The sport's state and the user's existing registrations are checked first, so that the common rejections
    /// are reported without opening a transaction. These checks are advisory only. The reservation itself is made
    /// by [`RegistrationDatabase::reserve_slot`], which re-checks capacity in the same statement that consumes it.
    ///
    /// On success the registration is PENDING and holds one slot.
    pub async fn reserve(&self, request: NewRegistration) -> Result<Registration, RegistrationError> {
        let user_id = request.user_id.clone();
        let sport_id = request.sport_id;
        let sport = self.sport(sport_id).await?;
        validate_team(&sport, request.team.as_ref())?;
        if !sport.registration_open {
            debug!("🔄️🎽️ {user_id} tried to register for {}, but registration is closed", sport.name);
            return Err(RegistrationError::RegistrationClosed);
        }
        if self.db.fetch_registration_for_user(&user_id, sport_id).await?.is_some() {
            debug!("🔄️🎽️ {user_id} is already registered for {}", sport.name);
            return Err(RegistrationError::AlreadyRegistered);
        }
        if !sport.has_capacity() {
            debug!("🔄️🎽️ {} is full ({}/{})", sport.name, sport.filled_slots, sport.max_slots);
            return Err(RegistrationError::SlotsFull);
        }
        let registration = self.db.reserve_slot(request).await?;
        info!("🔄️🎽️ {user_id} holds registration #{} for {}", registration.id, sport.name);
        let entry = NewAuditEntry::new(
            AuditAction::RegistrationCreated,
            AuditEntityType::Registration,
            registration.id,
            Actor::User(user_id),
        )
        .with_metadata(json!({
            "sport_id": sport_id,
            "sport": sport.name,
            "status": registration.status,
            "team_name": registration.team_name,
            "team_size": registration.team_members.as_ref().map(|m| m.0.len()),
        }));
        self.audit.record(entry).await;
        Ok(registration)
    }

    /// Collects what is needed to open a gateway order for the given registration, after checking that `user` owns
    /// it and that it is still waiting for payment.
    pub async fn payment_quote(&self, user: &UserId, registration_id: i64) -> Result<PaymentQuote, RegistrationError> {
        let registration = self.owned_registration(user, registration_id).await?;
        match registration.status {
            RegistrationStatus::Pending => {},
            RegistrationStatus::Confirmed => return Err(RegistrationError::PaymentAlreadyCompleted(registration_id)),
            _ => return Err(RegistrationError::RegistrationNotPending(registration_id)),
        }
        let payment = self.db.fetch_payment_for_registration(registration_id).await?;
        if matches!(payment.as_ref().map(|p| p.status), Some(PaymentStatus::Success | PaymentStatus::Refunded)) {
            return Err(RegistrationError::PaymentAlreadyCompleted(registration_id));
        }
        let sport = self.sport(registration.sport_id).await?;
        Ok(PaymentQuote { registration, sport, payment })
    }

    /// Records a gateway order (or the "pay later" placeholder) as the PENDING payment of a registration owned by
    /// `user`. Retrying replaces the previous order, and the stale reservation timeout starts again.
    pub async fn attach_payment_order(
        &self,
        user: &UserId,
        registration_id: i64,
        order_id: OrderId,
        amount: Paise,
    ) -> Result<Payment, RegistrationError> {
        self.owned_registration(user, registration_id).await?;
        let payment = self.db.attach_payment_order(registration_id, &order_id, amount).await?;
        debug!("🔄️💳️ Order {order_id} ({amount}) attached to registration #{registration_id}");
        let entry = NewAuditEntry::new(
            AuditAction::PaymentOrderCreated,
            AuditEntityType::Payment,
            payment.id,
            Actor::User(user.clone()),
        )
        .with_metadata(json!({
            "registration_id": registration_id,
            "order_id": order_id,
            "amount": amount,
            "placeholder": order_id.is_placeholder(),
        }));
        self.audit.record(entry).await;
        Ok(payment)
    }

    /// Fetches a registration and its payment. Ownership is not checked here.
    pub async fn registration(&self, registration_id: i64) -> Result<RegistrationDetail, RegistrationError> {
        let registration = self
            .db
            .fetch_registration(registration_id)
            .await?
            .ok_or(RegistrationError::RegistrationNotFound(registration_id))?;
        let payment = self.db.fetch_payment_for_registration(registration_id).await?;
        Ok(RegistrationDetail { registration, payment })
    }

    pub async fn registrations_for_user(&self, user: &UserId) -> Result<Vec<RegistrationDetail>, RegistrationError> {
        let registrations = self.db.fetch_registrations_for_user(user).await?;
        let mut result = Vec::with_capacity(registrations.len());
        for registration in registrations {
            let payment = self.db.fetch_payment_for_registration(registration.id).await?;
            result.push(RegistrationDetail { registration, payment });
        }
        Ok(result)
    }

    async fn owned_registration(&self, user: &UserId, registration_id: i64) -> Result<Registration, RegistrationError> {
        let registration = self
            .db
            .fetch_registration(registration_id)
            .await?
            .ok_or(RegistrationError::RegistrationNotFound(registration_id))?;
        if &registration.user_id != user {
            warn!("🔄️🎽️ {user} tried to access registration #{registration_id}, which belongs to someone else");
            return Err(RegistrationError::Forbidden(format!("Registration {registration_id} is not yours")));
        }
        Ok(registration)
    }
}
