//! `SqliteDatabase` is a concrete implementation of a registration engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::{fmt::Debug, time::Duration};

use chrono::Utc;
use log::*;
use sqlx::{migrate, SqliteConnection, SqlitePool};

use super::db::{audit, db_url, is_unique_violation, new_pool, payments, registrations, sports};
use crate::{
    db_types::{
        AuditLogEntry,
        NewAuditEntry,
        NewRegistration,
        NewSport,
        OrderId,
        Paise,
        Payment,
        PaymentStatus,
        Registration,
        RegistrationStatus,
        Sport,
        UserId,
    },
    traits::{
        AppliedTransition,
        AuditLog,
        AuditLogError,
        AuditLogFilter,
        CancelledRegistration,
        ExpiredRegistration,
        ManualPayment,
        PaymentCapture,
        PaymentFailure,
        PaymentTransition,
        RegistrationDatabase,
        RegistrationError,
        RegistrationQueryFilter,
        RegistrationStats,
        ReserveOutcome,
        SlotChange,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl RegistrationDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_sport(&self, sport_id: i64) -> Result<Option<Sport>, RegistrationError> {
        let mut conn = self.pool.acquire().await?;
        let sport = sports::fetch_sport(sport_id, &mut conn).await?;
        Ok(sport)
    }

    async fn fetch_sports(&self) -> Result<Vec<Sport>, RegistrationError> {
        let mut conn = self.pool.acquire().await?;
        let sports = sports::fetch_sports(&mut conn).await?;
        Ok(sports)
    }

    async fn insert_sport(&self, sport: NewSport) -> Result<Sport, RegistrationError> {
        sport.validate().map_err(RegistrationError::ValidationError)?;
        let mut conn = self.pool.acquire().await?;
        let slug = sport.slug.clone();
        let sport = sports::insert_sport(sport, &mut conn).await.map_err(|e| {
            if is_unique_violation(&e) {
                RegistrationError::ValidationError(format!("A sport with slug '{slug}' already exists"))
            } else {
                e.into()
            }
        })?;
        debug!("🗃️ Sport #{} ({}) created with {} slots", sport.id, sport.slug, sport.max_slots);
        Ok(sport)
    }

    async fn set_registration_open(&self, sport_id: i64, open: bool) -> Result<Sport, RegistrationError> {
        let mut conn = self.pool.acquire().await?;
        let sport = sports::set_registration_open(sport_id, open, &mut conn)
            .await?
            .ok_or(RegistrationError::SportNotFound(sport_id))?;
        Ok(sport)
    }

    async fn fetch_registration(&self, registration_id: i64) -> Result<Option<Registration>, RegistrationError> {
        let mut conn = self.pool.acquire().await?;
        let registration = registrations::fetch_registration(registration_id, &mut conn).await?;
        Ok(registration)
    }

    async fn fetch_registration_for_user(
        &self,
        user_id: &UserId,
        sport_id: i64,
    ) -> Result<Option<Registration>, RegistrationError> {
        let mut conn = self.pool.acquire().await?;
        let registration = registrations::fetch_registration_for_user(user_id, sport_id, &mut conn).await?;
        Ok(registration)
    }

    async fn fetch_registrations_for_user(&self, user_id: &UserId) -> Result<Vec<Registration>, RegistrationError> {
        let query = RegistrationQueryFilter::default().with_user_id(user_id.clone());
        self.search_registrations(query).await
    }

    async fn search_registrations(
        &self,
        filter: RegistrationQueryFilter,
    ) -> Result<Vec<Registration>, RegistrationError> {
        let mut conn = self.pool.acquire().await?;
        let registrations = registrations::search_registrations(filter, &mut conn).await?;
        Ok(registrations)
    }

    async fn fetch_payment_for_registration(
        &self,
        registration_id: i64,
    ) -> Result<Option<Payment>, RegistrationError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment_for_registration(registration_id, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_payment_by_order_id(&self, order_id: &OrderId) -> Result<Option<Payment>, RegistrationError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment_by_order_id(order_id, &mut conn).await?;
        Ok(payment)
    }

    /// The registration row is inserted first so that the transaction takes the write lock immediately. If the
    /// conditional increment then fails, returning early drops the transaction and the insert is rolled back.
    async fn reserve_slot(&self, registration: NewRegistration) -> Result<Registration, RegistrationError> {
        let sport_id = registration.sport_id;
        let user_id = registration.user_id.clone();
        let mut tx = self.pool.begin().await?;
        let registration = registrations::insert_registration(registration, &mut tx).await.map_err(|e| {
            if is_unique_violation(&e) {
                debug!("🗃️ {user_id} already holds a registration for sport #{sport_id}");
                RegistrationError::AlreadyRegistered
            } else {
                e.into()
            }
        })?;
        match sports::try_reserve(sport_id, &mut tx).await? {
            ReserveOutcome::Reserved => {},
            ReserveOutcome::CapacityExceeded => return Err(RegistrationError::SlotsFull),
            ReserveOutcome::RegistrationClosed => return Err(RegistrationError::RegistrationClosed),
            ReserveOutcome::SportNotFound => return Err(RegistrationError::SportNotFound(sport_id)),
        }
        tx.commit().await?;
        debug!("🗃️ Registration #{} for {user_id} holds a slot in sport #{sport_id}", registration.id);
        Ok(registration)
    }

    async fn attach_payment_order(
        &self,
        registration_id: i64,
        order_id: &OrderId,
        amount: Paise,
    ) -> Result<Payment, RegistrationError> {
        let mut tx = self.pool.begin().await?;
        if registrations::touch_pending(registration_id, &mut tx).await?.is_none() {
            return match registrations::fetch_registration(registration_id, &mut tx).await? {
                None => Err(RegistrationError::RegistrationNotFound(registration_id)),
                Some(r) if r.status == RegistrationStatus::Confirmed => {
                    Err(RegistrationError::PaymentAlreadyCompleted(registration_id))
                },
                Some(_) => Err(RegistrationError::RegistrationNotPending(registration_id)),
            };
        }
        let payment = match payments::replace_gateway_order(registration_id, order_id, amount, &mut tx).await? {
            Some(p) => {
                trace!("🗃️ Registration #{registration_id} now points at order {order_id}");
                p
            },
            None => match payments::fetch_payment_for_registration(registration_id, &mut tx).await? {
                Some(p) => {
                    debug!("🗃️ Payment for registration #{registration_id} is {}. Not replacing it", p.status);
                    return Err(RegistrationError::PaymentAlreadyCompleted(registration_id));
                },
                None => payments::insert_gateway_payment(registration_id, order_id, amount, &mut tx).await?,
            },
        };
        tx.commit().await?;
        debug!("🗃️ Order {order_id} for {amount} recorded against registration #{registration_id}");
        Ok(payment)
    }

    async fn mark_payment_succeeded(&self, capture: &PaymentCapture) -> Result<PaymentTransition, RegistrationError> {
        let order_id = &capture.order_id;
        let payment_id = capture.gateway_payment_id.as_str();
        let signature = capture.signature.as_deref();
        let mut tx = self.pool.begin().await?;
        let mut captured = None;
        for from in [PaymentStatus::Pending, PaymentStatus::Failed] {
            if let Some(p) = payments::capture(order_id, from, payment_id, signature, &mut tx).await? {
                captured = Some((p, from));
                break;
            }
        }
        let Some((payment, previous)) = captured else {
            return match payments::fetch_payment_by_order_id(order_id, &mut tx).await? {
                None => Err(RegistrationError::PaymentNotFound(order_id.to_string())),
                Some(p) if p.status == PaymentStatus::Success => {
                    trace!("🗃️ Payment for order {order_id} is already SUCCESS");
                    let registration = fetch_registration_in_tx(p.registration_id, &mut tx).await?;
                    Ok(PaymentTransition::Unchanged { payment: p, registration })
                },
                Some(p) => Err(RegistrationError::IllegalPaymentTransition(format!(
                    "Payment for order {order_id} is {} and cannot succeed",
                    p.status
                ))),
            };
        };
        let previous_registration = fetch_registration_in_tx(payment.registration_id, &mut tx).await?;
        let slot = if previous_registration.holds_slot {
            SlotChange::Retained
        } else {
            // The registration gave its slot back when the earlier attempt failed
            take_slot(&previous_registration, &mut tx).await?;
            SlotChange::Reacquired
        };
        let registration = set_registration_status(payment.registration_id, RegistrationStatus::Confirmed, &mut tx)
            .await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} captured. Registration #{} is CONFIRMED", registration.id);
        Ok(PaymentTransition::Applied(AppliedTransition {
            payment,
            registration,
            previous_payment_status: Some(previous),
            previous_registration_status: previous_registration.status,
            slot,
        }))
    }

    async fn mark_payment_failed(&self, failure: &PaymentFailure) -> Result<PaymentTransition, RegistrationError> {
        let order_id = &failure.order_id;
        let mut tx = self.pool.begin().await?;
        let Some(payment) = payments::fail(order_id, failure.gateway_payment_id.as_deref(), &mut tx).await? else {
            return match payments::fetch_payment_by_order_id(order_id, &mut tx).await? {
                None => Err(RegistrationError::PaymentNotFound(order_id.to_string())),
                Some(p) => {
                    trace!("🗃️ Payment for order {order_id} is {}. Ignoring the failure", p.status);
                    let registration = fetch_registration_in_tx(p.registration_id, &mut tx).await?;
                    Ok(PaymentTransition::Unchanged { payment: p, registration })
                },
            };
        };
        let previous = fetch_registration_in_tx(payment.registration_id, &mut tx).await?;
        let slot = if previous.holds_slot {
            give_back_slot(&previous, &mut tx).await?;
            SlotChange::Released
        } else {
            SlotChange::Retained
        };
        let registration =
            set_registration_status(payment.registration_id, RegistrationStatus::Cancelled, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} failed. Registration #{} is CANCELLED ({slot:?})", registration.id);
        Ok(PaymentTransition::Applied(AppliedTransition {
            payment,
            registration,
            previous_payment_status: Some(PaymentStatus::Pending),
            previous_registration_status: previous.status,
            slot,
        }))
    }

    async fn mark_payment_refunded(
        &self,
        gateway_payment_id: &str,
        release_slot: bool,
    ) -> Result<PaymentTransition, RegistrationError> {
        let mut tx = self.pool.begin().await?;
        let mut refunded = None;
        for from in [PaymentStatus::Success, PaymentStatus::Pending] {
            if let Some(p) = payments::refund(gateway_payment_id, from, &mut tx).await? {
                refunded = Some((p, from));
                break;
            }
        }
        let Some((refunded, previous_payment_status)) = refunded else {
            return match payments::fetch_payment_by_gateway_id(gateway_payment_id, &mut tx).await? {
                None => Err(RegistrationError::PaymentNotFound(gateway_payment_id.to_string())),
                Some(p) => {
                    trace!("🗃️ Payment {gateway_payment_id} is {}. Ignoring the refund", p.status);
                    let registration = fetch_registration_in_tx(p.registration_id, &mut tx).await?;
                    Ok(PaymentTransition::Unchanged { payment: p, registration })
                },
            };
        };
        let previous = fetch_registration_in_tx(refunded.registration_id, &mut tx).await?;
        let slot = if release_slot && previous.holds_slot {
            give_back_slot(&previous, &mut tx).await?;
            SlotChange::Released
        } else {
            SlotChange::Retained
        };
        let registration =
            set_registration_status(refunded.registration_id, RegistrationStatus::Cancelled, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Payment {gateway_payment_id} refunded. Registration #{} is CANCELLED ({slot:?})", registration.id);
        Ok(PaymentTransition::Applied(AppliedTransition {
            payment: refunded,
            registration,
            previous_payment_status: Some(previous_payment_status),
            previous_registration_status: previous.status,
            slot,
        }))
    }

    async fn confirm_manual_payment(
        &self,
        manual: &ManualPayment,
        admin: &UserId,
    ) -> Result<PaymentTransition, RegistrationError> {
        use RegistrationStatus::*;
        let id = manual.registration_id;
        let mut tx = self.pool.begin().await?;
        let mut confirmed = None;
        for from in [Pending, Cancelled, Waitlisted] {
            if let Some(r) = registrations::transition_status(id, &[from], Confirmed, &mut tx).await? {
                confirmed = Some((r, from));
                break;
            }
        }
        let Some((registration, previous_status)) = confirmed else {
            return match registrations::fetch_registration(id, &mut tx).await? {
                None => Err(RegistrationError::RegistrationNotFound(id)),
                Some(_) => Err(RegistrationError::AlreadyConfirmed(id)),
            };
        };
        // A refund recorded with the slot kept leaves a CANCELLED registration that still holds it
        let (registration, slot) = if registration.holds_slot {
            (registration, SlotChange::Retained)
        } else {
            (take_slot(&registration, &mut tx).await?, SlotChange::Reacquired)
        };
        let previous_payment = payments::fetch_payment_for_registration(id, &mut tx).await?;
        let now = Utc::now().timestamp_millis();
        let order_id = format!("MANUAL_{now}_{id}");
        let gateway_payment_id = format!("MANUAL_{}_{now}_{id}", manual.method);
        let signature = format!("MANUAL_BY_{admin}");
        let record = payments::ManualPaymentRecord {
            registration_id: id,
            order_id: &order_id,
            gateway_payment_id: &gateway_payment_id,
            signature: &signature,
            amount: manual.amount,
            method: manual.method,
            reference: manual.reference.as_deref(),
            notes: manual.notes.as_deref(),
            confirmed_by: admin,
        };
        let payment = payments::upsert_manual_payment(record, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Registration #{id} confirmed manually by {admin} ({} {})", manual.method, manual.amount);
        Ok(PaymentTransition::Applied(AppliedTransition {
            payment,
            registration,
            previous_payment_status: previous_payment.map(|p| p.status),
            previous_registration_status: previous_status,
            slot,
        }))
    }

    async fn delete_registration(&self, registration_id: i64) -> Result<CancelledRegistration, RegistrationError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::delete_for_registration(registration_id, &mut tx).await?;
        let registration = registrations::delete_registration(registration_id, &mut tx)
            .await?
            .ok_or(RegistrationError::RegistrationNotFound(registration_id))?;
        let slot_released = if registration.holds_slot {
            sports::release(registration.sport_id, &mut tx).await?
        } else {
            false
        };
        tx.commit().await?;
        debug!(
            "🗃️ Registration #{registration_id} ({}) deleted. Slot released: {slot_released}",
            registration.status
        );
        Ok(CancelledRegistration { registration, payment, slot_released })
    }

    async fn expire_stale_registrations(
        &self,
        timeout: Duration,
    ) -> Result<Vec<ExpiredRegistration>, RegistrationError> {
        let mut tx = self.pool.begin().await?;
        let cancelled = registrations::cancel_stale_pending(timeout, &mut tx).await?;
        let mut result = Vec::with_capacity(cancelled.len());
        for registration in cancelled {
            let payment = payments::fail_pending_for_registration(registration.id, &mut tx).await?;
            sports::release(registration.sport_id, &mut tx).await?;
            trace!("🗃️ Stale registration #{} expired", registration.id);
            result.push(ExpiredRegistration { registration, payment });
        }
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_stats(&self) -> Result<RegistrationStats, RegistrationError> {
        let mut conn = self.pool.acquire().await?;
        let mut stats = RegistrationStats::default();
        for (status, count) in registrations::count_by_status(&mut conn).await? {
            stats.total_registrations += count;
            match status {
                RegistrationStatus::Pending => stats.pending = count,
                RegistrationStatus::Confirmed => stats.confirmed = count,
                RegistrationStatus::Cancelled => stats.cancelled = count,
                RegistrationStatus::Waitlisted => stats.waitlisted = count,
            }
        }
        stats.revenue = payments::total_revenue(&mut conn).await?;
        stats.sports = registrations::sport_summaries(&mut conn).await?;
        Ok(stats)
    }
}

impl AuditLog for SqliteDatabase {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, AuditLogError> {
        let mut conn = self.pool.acquire().await?;
        let entry = audit::insert_entry(entry, &mut conn).await?;
        trace!("📝️ Audit entry #{} ({:?}) appended", entry.id, entry.action);
        Ok(entry)
    }

    async fn fetch_audit_entries(&self, filter: AuditLogFilter) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let mut conn = self.pool.acquire().await?;
        let entries = audit::fetch_entries(filter, &mut conn).await?;
        Ok(entries)
    }
}

async fn fetch_registration_in_tx(id: i64, conn: &mut SqliteConnection) -> Result<Registration, RegistrationError> {
    registrations::fetch_registration(id, conn).await?.ok_or(RegistrationError::RegistrationNotFound(id))
}

async fn set_registration_status(
    id: i64,
    status: RegistrationStatus,
    conn: &mut SqliteConnection,
) -> Result<Registration, RegistrationError> {
    use RegistrationStatus::*;
    registrations::transition_status(id, &[Pending, Confirmed, Cancelled, Waitlisted], status, conn)
        .await?
        .ok_or(RegistrationError::RegistrationNotFound(id))
}

/// Claims a slot for a registration that had given its slot back, and records that it holds one again.
async fn take_slot(
    registration: &Registration,
    conn: &mut SqliteConnection,
) -> Result<Registration, RegistrationError> {
    reserve_or_fail(registration.sport_id, conn).await?;
    registrations::set_holds_slot(registration.id, true, conn)
        .await?
        .ok_or(RegistrationError::RegistrationNotFound(registration.id))
}

async fn give_back_slot(registration: &Registration, conn: &mut SqliteConnection) -> Result<(), RegistrationError> {
    sports::release(registration.sport_id, conn).await?;
    registrations::set_holds_slot(registration.id, false, conn).await?;
    Ok(())
}

async fn reserve_or_fail(sport_id: i64, conn: &mut SqliteConnection) -> Result<(), RegistrationError> {
    match sports::try_reserve(sport_id, conn).await? {
        ReserveOutcome::Reserved => Ok(()),
        ReserveOutcome::CapacityExceeded => Err(RegistrationError::SlotsFull),
        ReserveOutcome::RegistrationClosed => Err(RegistrationError::RegistrationClosed),
        ReserveOutcome::SportNotFound => Err(RegistrationError::SportNotFound(sport_id)),
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    /// Creates a new database API object with the given database URL
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Applies any outstanding schema migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }

    /// Returns a reference to the database connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the database connection pool
    pub async fn close(&mut self) -> Result<(), sqlx::Error> {
        self.pool.close().await;
        Ok(())
    }
}
