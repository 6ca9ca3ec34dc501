use std::{fmt::Debug, time::Duration};

use log::*;
use serde_json::json;

use crate::{
    db_types::{Actor, AuditAction, AuditEntityType, AuditLogEntry, NewAuditEntry, NewSport, Registration, Sport, UserId},
    events::{AnnulmentReason, EventProducers, RegistrationAnnulledEvent},
    fest_api::audit_trail::AuditTrail,
    traits::{
        AuditLog,
        AuditLogFilter,
        CancelledRegistration,
        ExpiredRegistration,
        RegistrationDatabase,
        RegistrationError,
        RegistrationQueryFilter,
        RegistrationStats,
        SlotChange,
    },
};

/// The default number of audit entries returned when a query does not set a limit.
pub const DEFAULT_AUDIT_LIMIT: i64 = 100;

/// `AdminApi` holds the administrative operations: cancelling registrations, managing sports, searching, statistics,
/// the audit log, and the stale reservation sweep.
///
/// Callers are expected to have checked that the acting user is an administrator.
pub struct AdminApi<B, L> {
    db: B,
    audit: AuditTrail<L>,
    producers: EventProducers,
}

impl<B, L> Debug for AdminApi<B, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AdminApi")
    }
}

impl<B, L> AdminApi<B, L>
where L: AuditLog
{
    pub fn new(db: B, audit_log: L, producers: EventProducers) -> Self {
        Self { db, audit: AuditTrail::new(audit_log), producers }
    }
}

impl<B, L> AdminApi<B, L>
where
    B: RegistrationDatabase,
    L: AuditLog,
{
    /// Deletes a registration and its payment. The slot is released unless the registration had already given it
    /// up. The audit entry keeps a snapshot of what was deleted.
    pub async fn cancel_registration(
        &self,
        registration_id: i64,
        admin: &UserId,
    ) -> Result<CancelledRegistration, RegistrationError> {
        let cancelled = self.db.delete_registration(registration_id).await?;
        let registration = &cancelled.registration;
        info!(
            "🔄️🗑️ {admin} deleted registration #{registration_id} ({} for sport #{}, {}). Slot released: {}",
            registration.user_id, registration.sport_id, registration.status, cancelled.slot_released
        );
        let entry = NewAuditEntry::new(
            AuditAction::RegistrationCancelled,
            AuditEntityType::Registration,
            registration_id,
            Actor::Admin(admin.clone()),
        )
        .with_metadata(json!({
            "sport_id": registration.sport_id,
            "user_id": registration.user_id,
            "previous_status": registration.status,
            "team_name": registration.team_name,
            "payment": cancelled.payment.as_ref().map(|p| json!({
                "order_id": p.order_id,
                "gateway_payment_id": p.gateway_payment_id,
                "status": p.status,
                "amount": p.amount,
                "method": p.method,
            })),
            "slot_released": cancelled.slot_released,
        }));
        self.audit.record(entry).await;
        let slot = if cancelled.slot_released { SlotChange::Released } else { SlotChange::Retained };
        let event = RegistrationAnnulledEvent::new(registration.clone(), AnnulmentReason::CancelledByAdmin, slot);
        self.producers.publish_registration_annulled(event).await;
        Ok(cancelled)
    }

    pub async fn create_sport(&self, sport: NewSport, admin: &UserId) -> Result<Sport, RegistrationError> {
        let sport = self.db.insert_sport(sport).await?;
        info!("🔄️🏅️ {admin} created sport #{} ({}) with {} slots", sport.id, sport.name, sport.max_slots);
        let entry =
            NewAuditEntry::new(AuditAction::SportCreated, AuditEntityType::Sport, sport.id, Actor::Admin(admin.clone()))
                .with_metadata(json!({
                    "slug": sport.slug,
                    "name": sport.name,
                    "max_slots": sport.max_slots,
                    "fee": sport.fee,
                    "registration_open": sport.registration_open,
                    "team_size": [sport.min_team_size, sport.max_team_size],
                }));
        self.audit.record(entry).await;
        Ok(sport)
    }

    pub async fn set_registration_open(
        &self,
        sport_id: i64,
        open: bool,
        admin: &UserId,
    ) -> Result<Sport, RegistrationError> {
        let sport = self.db.set_registration_open(sport_id, open).await?;
        let state = if open { "opened" } else { "closed" };
        info!("🔄️🏅️ {admin} {state} registration for {}", sport.name);
        let entry =
            NewAuditEntry::new(AuditAction::SportUpdated, AuditEntityType::Sport, sport_id, Actor::Admin(admin.clone()))
                .with_metadata(json!({ "registration_open": open, "filled_slots": sport.filled_slots }));
        self.audit.record(entry).await;
        Ok(sport)
    }

    pub async fn search_registrations(
        &self,
        filter: RegistrationQueryFilter,
    ) -> Result<Vec<Registration>, RegistrationError> {
        self.db.search_registrations(filter).await
    }

    pub async fn stats(&self) -> Result<RegistrationStats, RegistrationError> {
        self.db.fetch_stats().await
    }

    pub async fn audit_entries(&self, mut filter: AuditLogFilter) -> Result<Vec<AuditLogEntry>, RegistrationError> {
        filter.limit.get_or_insert(DEFAULT_AUDIT_LIMIT);
        self.audit.fetch(filter).await.map_err(|e| RegistrationError::DatabaseError(e.to_string()))
    }

    /// Cancels PENDING registrations that have not seen any activity for longer than `timeout`, and gives their
    /// slots back.
    pub async fn expire_stale_registrations(
        &self,
        timeout: Duration,
    ) -> Result<Vec<ExpiredRegistration>, RegistrationError> {
        let expired = self.db.expire_stale_registrations(timeout).await?;
        if !expired.is_empty() {
            info!("🔄️🕰️ {} stale registrations expired", expired.len());
        }
        for e in &expired {
            let entry = NewAuditEntry::new(
                AuditAction::RegistrationExpired,
                AuditEntityType::Registration,
                e.registration.id,
                Actor::System,
            )
            .with_metadata(json!({
                "sport_id": e.registration.sport_id,
                "user_id": e.registration.user_id,
                "order_id": e.payment.as_ref().map(|p| &p.order_id),
                "timeout_secs": timeout.as_secs(),
                "slot_released": true,
            }));
            self.audit.record(entry).await;
            let event =
                RegistrationAnnulledEvent::new(e.registration.clone(), AnnulmentReason::Expired, SlotChange::Released);
            self.producers.publish_registration_annulled(event).await;
        }
        Ok(expired)
    }
}
