//! The audit log table is append-only. Triggers in the schema reject any `UPDATE` or `DELETE`.
use log::*;
use sqlx::{types::Json, QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{AuditLogEntry, NewAuditEntry},
    traits::AuditLogFilter,
};

pub async fn insert_entry(entry: NewAuditEntry, conn: &mut SqliteConnection) -> Result<AuditLogEntry, sqlx::Error> {
    let entry = sqlx::query_as(
        r#"
        INSERT INTO audit_log (action, entity_type, entity_id, actor, metadata, outcome)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(entry.action)
    .bind(entry.entity_type)
    .bind(entry.entity_id)
    .bind(entry.actor.to_string())
    .bind(Json(entry.metadata))
    .bind(entry.outcome)
    .fetch_one(conn)
    .await?;
    Ok(entry)
}

pub async fn fetch_entries(
    filter: AuditLogFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<AuditLogEntry>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM audit_log ");
    let has_conditions = filter.entity_type.is_some() || filter.entity_id.is_some() || filter.action.is_some();
    if has_conditions {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(entity_type) = filter.entity_type {
        where_clause.push("entity_type = ");
        where_clause.push_bind_unseparated(entity_type);
    }
    if let Some(entity_id) = filter.entity_id {
        where_clause.push("entity_id = ");
        where_clause.push_bind_unseparated(entity_id);
    }
    if let Some(action) = filter.action {
        where_clause.push("action = ");
        where_clause.push_bind_unseparated(action);
    }
    builder.push(" ORDER BY id DESC");
    if let Some(limit) = filter.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }
    trace!("📝️ Executing query: {}", builder.sql());
    let entries = builder.build_query_as::<AuditLogEntry>().fetch_all(conn).await?;
    Ok(entries)
}
