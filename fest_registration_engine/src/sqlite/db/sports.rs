//! Sports, and the Capacity Ledger.
//!
//! `filled_slots` is only changed by [`try_reserve`] and [`release`]. Both are single conditional `UPDATE` statements,
//! so the bound check and the write cannot be separated by another writer.
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewSport, Sport},
    traits::ReserveOutcome,
};

pub async fn fetch_sport(id: i64, conn: &mut SqliteConnection) -> Result<Option<Sport>, sqlx::Error> {
    let sport = sqlx::query_as("SELECT * FROM sports WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(sport)
}

pub async fn fetch_sports(conn: &mut SqliteConnection) -> Result<Vec<Sport>, sqlx::Error> {
    let sports = sqlx::query_as("SELECT * FROM sports ORDER BY name ASC").fetch_all(conn).await?;
    Ok(sports)
}

pub async fn insert_sport(sport: NewSport, conn: &mut SqliteConnection) -> Result<Sport, sqlx::Error> {
    let sport = sqlx::query_as(
        r#"
        INSERT INTO sports (slug, name, max_slots, fee, registration_open, min_team_size, max_team_size)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(sport.slug)
    .bind(sport.name)
    .bind(sport.max_slots)
    .bind(sport.fee)
    .bind(sport.registration_open)
    .bind(sport.min_team_size)
    .bind(sport.max_team_size)
    .fetch_one(conn)
    .await?;
    Ok(sport)
}

pub async fn set_registration_open(
    id: i64,
    open: bool,
    conn: &mut SqliteConnection,
) -> Result<Option<Sport>, sqlx::Error> {
    let sport = sqlx::query_as(
        "UPDATE sports SET registration_open = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(open)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(sport)
}

/// Takes one slot of the sport, if registration is open and a slot is free at the moment of the write.
///
/// When the increment does not apply, the sport is read back on the same connection to tell the caller why. Inside
/// a transaction that read happens after the failed write, so the write lock is already held.
pub async fn try_reserve(id: i64, conn: &mut SqliteConnection) -> Result<ReserveOutcome, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE sports SET filled_slots = filled_slots + 1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND registration_open = 1 AND filled_slots < max_slots
        "#,
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 1 {
        trace!("🗃️ Reserved a slot for sport #{id}");
        return Ok(ReserveOutcome::Reserved);
    }
    let outcome = match fetch_sport(id, conn).await? {
        None => ReserveOutcome::SportNotFound,
        Some(sport) if !sport.registration_open => ReserveOutcome::RegistrationClosed,
        Some(_) => ReserveOutcome::CapacityExceeded,
    };
    debug!("🗃️ Could not reserve a slot for sport #{id}: {outcome:?}");
    Ok(outcome)
}

/// Gives one slot back to the sport. Returns false if the counter was already zero, which indicates that the
/// counter and the registrations have drifted apart.
pub async fn release(id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE sports SET filled_slots = filled_slots - 1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND filled_slots > 0
        "#,
    )
    .bind(id)
    .execute(conn)
    .await?;
    let released = result.rows_affected() == 1;
    if released {
        trace!("🗃️ Released a slot for sport #{id}");
    } else {
        warn!(
            "🗃️ Tried to release a slot for sport #{id}, but its counter is already at zero (or the sport is gone). \
             The slot counter may have drifted from the registrations."
        );
    }
    Ok(released)
}
