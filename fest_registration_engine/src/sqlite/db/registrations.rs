use std::time::Duration;

use log::*;
use sqlx::{types::Json, QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{NewRegistration, Registration, RegistrationStatus, UserId},
    traits::{RegistrationQueryFilter, SportSummary},
};

/// Inserts a new registration in the PENDING state. A second registration for the same user and sport violates the
/// `UNIQUE (user_id, sport_id)` constraint.
pub async fn insert_registration(
    registration: NewRegistration,
    conn: &mut SqliteConnection,
) -> Result<Registration, sqlx::Error> {
    let (team_name, team_members) = match registration.team {
        Some(team) => (Some(team.team_name), Some(Json(team.members))),
        None => (None, None),
    };
    let registration = sqlx::query_as(
        r#"
        INSERT INTO registrations (user_id, sport_id, status, team_name, team_members)
        VALUES ($1, $2, 'PENDING', $3, $4)
        RETURNING *
        "#,
    )
    .bind(registration.user_id)
    .bind(registration.sport_id)
    .bind(team_name)
    .bind(team_members)
    .fetch_one(conn)
    .await?;
    Ok(registration)
}

pub async fn fetch_registration(id: i64, conn: &mut SqliteConnection) -> Result<Option<Registration>, sqlx::Error> {
    let registration =
        sqlx::query_as("SELECT * FROM registrations WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(registration)
}

pub async fn fetch_registration_for_user(
    user_id: &UserId,
    sport_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Registration>, sqlx::Error> {
    let registration = sqlx::query_as("SELECT * FROM registrations WHERE user_id = $1 AND sport_id = $2")
        .bind(user_id.as_str())
        .bind(sport_id)
        .fetch_optional(conn)
        .await?;
    Ok(registration)
}

pub async fn search_registrations(
    query: RegistrationQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Registration>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new(
        r#"
    SELECT * FROM registrations
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(sport_id) = query.sport_id {
        where_clause.push("sport_id = ");
        where_clause.push_bind_unseparated(sport_id);
    }
    if let Some(user_id) = query.user_id {
        where_clause.push("user_id = ");
        where_clause.push_bind_unseparated(user_id.0);
    }
    if let Some(statuses) = query.statuses.filter(|s| !s.is_empty()) {
        where_clause.push("status IN (");
        let mut first = true;
        for status in statuses {
            if !first {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
            first = false;
        }
        where_clause.push_unseparated(")");
    }
    builder.push(" ORDER BY created_at ASC, id ASC");

    trace!("🗃️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Registration>();
    let registrations = query.fetch_all(conn).await?;
    trace!("🗃️ Result of search_registrations: {:?}", registrations.len());
    Ok(registrations)
}

/// Changes the status of the registration, but only if its current status is one of `from`.
/// Returns the updated registration, or `None` if the guard did not match (or the registration does not exist).
pub async fn transition_status(
    id: i64,
    from: &[RegistrationStatus],
    to: RegistrationStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Registration>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE registrations SET status = ");
    builder.push_bind(to);
    builder.push(", updated_at = CURRENT_TIMESTAMP WHERE id = ");
    builder.push_bind(id);
    builder.push(" AND status IN (");
    let mut statuses = builder.separated(", ");
    for status in from {
        statuses.push_bind(*status);
    }
    builder.push(") RETURNING *");
    let registration = builder.build_query_as::<Registration>().fetch_optional(conn).await?;
    Ok(registration)
}

/// Records whether the registration occupies a slot of its sport. Callers adjust `filled_slots` in the same
/// transaction.
pub async fn set_holds_slot(
    id: i64,
    holds_slot: bool,
    conn: &mut SqliteConnection,
) -> Result<Option<Registration>, sqlx::Error> {
    let registration = sqlx::query_as("UPDATE registrations SET holds_slot = $1 WHERE id = $2 RETURNING *")
        .bind(holds_slot)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(registration)
}

/// Bumps `updated_at` on a PENDING registration. Returns `None` if the registration is not PENDING.
pub async fn touch_pending(id: i64, conn: &mut SqliteConnection) -> Result<Option<Registration>, sqlx::Error> {
    let registration = sqlx::query_as(
        "UPDATE registrations SET updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND status = 'PENDING' RETURNING *",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(registration)
}

pub async fn delete_registration(id: i64, conn: &mut SqliteConnection) -> Result<Option<Registration>, sqlx::Error> {
    let registration =
        sqlx::query_as("DELETE FROM registrations WHERE id = $1 RETURNING *").bind(id).fetch_optional(conn).await?;
    Ok(registration)
}

/// Cancels PENDING registrations older than `limit` that do not have a successful payment, and marks them as no
/// longer holding a slot. The returned rows carry `holds_slot = false`.
pub(crate) async fn cancel_stale_pending(
    limit: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Registration>, sqlx::Error> {
    let seconds = i64::try_from(limit.as_secs()).unwrap_or(i64::MAX);
    let rows = sqlx::query_as(
        r#"
        UPDATE registrations SET status = 'CANCELLED', holds_slot = 0, updated_at = CURRENT_TIMESTAMP
        WHERE status = 'PENDING'
          AND (unixepoch(CURRENT_TIMESTAMP) - unixepoch(updated_at)) > $1
          AND id NOT IN (SELECT registration_id FROM payments WHERE status = 'SUCCESS')
        RETURNING *
        "#,
    )
    .bind(seconds)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn count_by_status(conn: &mut SqliteConnection) -> Result<Vec<(RegistrationStatus, i64)>, sqlx::Error> {
    let rows = sqlx::query_as("SELECT status, COUNT(*) FROM registrations GROUP BY status").fetch_all(conn).await?;
    Ok(rows)
}

pub async fn sport_summaries(conn: &mut SqliteConnection) -> Result<Vec<SportSummary>, sqlx::Error> {
    let rows = sqlx::query_as(
        r#"
        SELECT
            sports.id AS id,
            sports.name AS name,
            sports.max_slots AS max_slots,
            sports.filled_slots AS filled_slots,
            COUNT(CASE WHEN registrations.status = 'CONFIRMED' THEN 1 END) AS confirmed,
            COUNT(CASE WHEN registrations.status = 'PENDING' THEN 1 END) AS pending
        FROM sports LEFT JOIN registrations ON registrations.sport_id = sports.id
        GROUP BY sports.id
        ORDER BY sports.name ASC
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
