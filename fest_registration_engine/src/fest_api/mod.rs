//! # Registration engine public API
//!
//! The `fest_api` module exposes the programmatic API for the festival registration engine. It is split by audience,
//! so that the HTTP layer (or a CLI, or a test) only holds the capabilities it needs.
//!
//! * [`reservation_api`] turns registration requests into capacity-bounded claims and records gateway orders against
//!   them. It also provides the read-only accessors for sports and registrations.
//! * [`reconciliation_api`] applies payment outcomes (checkout verification, gateway webhooks and offline payments
//!   confirmed by an administrator) to registrations.
//! * [`admin_api`] covers administrative cancellation, sport management, search, statistics, the audit log and the
//!   stale reservation sweep.
//!
//! The other submodules in this module are support and utility functions and types.
//!
//! # API usage
//!
//! The pattern for using all the APIs is the same. An API instance is created by supplying a database backend that
//! implements [`crate::traits::RegistrationDatabase`] and an audit writer that implements [`crate::traits::AuditLog`].
//! `SqliteDatabase` implements both, so the same (cheaply cloneable) handle is usually passed twice.
//!
//! ```rust,ignore
//! use fest_registration_engine::{db_types::NewRegistration, ReservationApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/fest.db", 25).await?;
//! let api = ReservationApi::new(db.clone(), db);
//! let registration = api.reserve(NewRegistration::new("alice", 1)).await?;
//! ```

pub mod admin_api;
pub mod audit_trail;
pub mod reconciliation_api;
pub mod reconciliation_objects;
pub mod registration_objects;
pub mod reservation_api;
