//! # Storage contracts.
//!
//! This module defines the interfaces that registration engine database *backends* must implement.
//!
//! * [`RegistrationDatabase`] covers sports, registrations and payments, including every transactional state
//!   transition and the Capacity Ledger primitives they rely on.
//! * [`AuditLog`] is the append-only audit store. It is a separate trait so that the APIs can be handed an audit
//!   writer explicitly, and so that a failing audit store can never roll back a registration or payment change.
mod audit_log;
mod data_objects;
mod registration_database;

pub use audit_log::{AuditLog, AuditLogError};
pub use data_objects::{
    AppliedTransition,
    AuditLogFilter,
    CancelledRegistration,
    ExpiredRegistration,
    ManualPayment,
    PaymentCapture,
    PaymentFailure,
    PaymentTransition,
    RegistrationQueryFilter,
    RegistrationStats,
    ReserveOutcome,
    SlotChange,
    SportSummary,
};
pub use registration_database::{RegistrationDatabase, RegistrationError};
