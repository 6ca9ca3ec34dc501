//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interaction are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool,
//! or create an atomic transaction as the need arises and call through to the functions without any other changes.
//!
//! SQLite transactions are started as `DEFERRED`. A transaction that reads before it writes holds a read snapshot
//! that cannot be upgraded once another connection has committed, which surfaces as `SQLITE_BUSY`. Every write
//! transaction in this crate therefore starts with a write statement.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod audit;
pub mod payments;
pub mod registrations;
pub mod sports;

const SQLITE_DB_URL: &str = "sqlite://data/fest.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn db_url() -> String {
    let result = env::var("FRS_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ FRS_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// True if the error is a violation of a UNIQUE constraint.
pub fn is_unique_violation(e: &SqlxError) -> bool {
    matches!(e, SqlxError::Database(db_err) if db_err.is_unique_violation())
}
