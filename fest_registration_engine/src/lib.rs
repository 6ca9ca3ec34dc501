//! Festival Registration Engine
//!
//! The registration engine is the core of the college sports festival registration service. It reserves
//! limited-capacity slots in sports, records the payment orders opened against those reservations, and reconciles the
//! asynchronous payment outcomes (checkout verification, gateway webhooks, offline payments) back into a consistent
//! state. It is independent of the HTTP layer and of the payment gateway's order API.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`] and [`mod@traits`]). SQLite is the supported backend. All
//!    mutual exclusion happens in the database: every status change is a guarded update inside a transaction, and
//!    sport capacity is only ever consumed by a conditional increment. You should not need to access the database
//!    directly. Instead, use the public API. The exception is the data types used in the database. These are defined
//!    in the `db_types` module and are public.
//! 2. The public API ([`mod@fest_api`]). [`ReservationApi`], [`ReconciliationApi`] and [`AdminApi`] each take a
//!    database backend and an audit log writer, and write one audit entry for every state change they make.
//!
//! The engine also provides a set of events that can be subscribed to. When a registration is confirmed, or stops
//! holding a claim on its sport, an event is emitted. A simple Actor framework is used so that you can easily hook
//! into these events and perform custom actions.
pub mod db_types;
pub mod events;
pub mod fest_api;
pub mod helpers;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use fest_api::{
    admin_api::AdminApi,
    reconciliation_api::ReconciliationApi,
    reconciliation_objects,
    registration_objects,
    reservation_api::ReservationApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{AuditLog, AuditLogError, RegistrationDatabase, RegistrationError};
