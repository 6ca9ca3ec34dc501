use thiserror::Error;

use crate::{
    db_types::{AuditLogEntry, NewAuditEntry},
    traits::data_objects::AuditLogFilter,
};

/// An append-only store of audit entries.
///
/// Entries are never updated or deleted. The engine APIs receive an `AuditLog` as an explicit dependency and write to
/// it after the controlling transaction has committed.
#[allow(async_fn_in_trait)]
pub trait AuditLog: Clone {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, AuditLogError>;

    /// Fetches entries matching the filter, newest first.
    async fn fetch_audit_entries(&self, filter: AuditLogFilter) -> Result<Vec<AuditLogEntry>, AuditLogError>;
}

#[derive(Debug, Clone, Error)]
pub enum AuditLogError {
    #[error("Could not access the audit log. {0}")]
    DatabaseError(String),
    #[error("Could not serialize audit metadata. {0}")]
    MetadataError(String),
}

impl From<sqlx::Error> for AuditLogError {
    fn from(e: sqlx::Error) -> Self {
        AuditLogError::DatabaseError(e.to_string())
    }
}
