use std::fmt::Debug;

use log::*;
use serde_json::{json, Value};

use crate::{
    db_types::{AuditLogEntry, NewAuditEntry},
    traits::{AppliedTransition, AuditLog, AuditLogError, AuditLogFilter},
};

/// A thin wrapper around an [`AuditLog`] backend.
///
/// Writing an audit entry is best-effort: the state change it describes has already been committed, so a failure to
/// append is logged and swallowed rather than reported to the caller.
#[derive(Clone)]
pub struct AuditTrail<L> {
    log: L,
}

impl<L> Debug for AuditTrail<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuditTrail")
    }
}

impl<L> AuditTrail<L>
where L: AuditLog
{
    pub fn new(log: L) -> Self {
        Self { log }
    }

    pub async fn record(&self, entry: NewAuditEntry) {
        let action = entry.action;
        let entity = format!("{:?} #{}", entry.entity_type, entry.entity_id);
        match self.log.append(entry).await {
            Ok(e) => trace!("📝️ {action:?} on {entity} recorded as audit entry #{}", e.id),
            Err(e) => warn!("📝️ Could not record {action:?} on {entity} in the audit log. {e}"),
        }
    }

    pub async fn fetch(&self, filter: AuditLogFilter) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        self.log.fetch_audit_entries(filter).await
    }
}

/// Old and new state of a payment transition, in the shape stored in audit metadata.
pub fn transition_metadata(t: &AppliedTransition) -> Value {
    json!({
        "registration_id": t.registration.id,
        "sport_id": t.registration.sport_id,
        "user_id": t.registration.user_id,
        "order_id": t.payment.order_id,
        "gateway_payment_id": t.payment.gateway_payment_id,
        "amount": t.payment.amount,
        "method": t.payment.method,
        "previous_payment_status": t.previous_payment_status,
        "payment_status": t.payment.status,
        "previous_registration_status": t.previous_registration_status,
        "registration_status": t.registration.status,
        "slot": t.slot,
    })
}

/// Merges the fields of `extra` into `metadata`. Both must be JSON objects, otherwise `metadata` is returned as is.
pub fn merge_metadata(mut metadata: Value, extra: Value) -> Value {
    if let (Some(target), Value::Object(extra)) = (metadata.as_object_mut(), extra) {
        target.extend(extra);
    }
    metadata
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::merge_metadata;

    #[test]
    fn merge_adds_and_overrides_fields() {
        let merged = merge_metadata(json!({"a": 1, "b": 2}), json!({"b": 3, "c": "x"}));
        assert_eq!(merged, json!({"a": 1, "b": 3, "c": "x"}));
    }

    #[test]
    fn merge_ignores_non_objects() {
        assert_eq!(merge_metadata(json!({"a": 1}), json!(null)), json!({"a": 1}));
        assert_eq!(merge_metadata(json!([1]), json!({"a": 1})), json!([1]));
    }
}
