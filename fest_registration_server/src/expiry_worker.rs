use std::time::Duration;

use fest_registration_engine::{
    events::EventProducers,
    traits::ExpiredRegistration,
    AdminApi,
    SqliteDatabase,
};
use log::*;
use tokio::task::JoinHandle;

pub const EXPIRY_INTERVAL: Duration = Duration::from_secs(60);

/// Starts the stale registration sweep. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every minute, PENDING registrations that have seen no activity for longer than `timeout` are cancelled and their
/// slots are given back to their sports.
pub fn start_expiry_worker(db: SqliteDatabase, producers: EventProducers, timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(EXPIRY_INTERVAL);
        let api = AdminApi::new(db.clone(), db, producers);
        info!("🕰️ Stale registration expiry worker started. Timeout: {} min", timeout.as_secs() / 60);
        loop {
            timer.tick().await;
            trace!("🕰️ Running stale registration expiry job");
            match api.expire_stale_registrations(timeout).await {
                Ok(expired) if expired.is_empty() => trace!("🕰️ No stale registrations"),
                Ok(expired) => {
                    info!("🕰️ {} stale registrations expired", expired.len());
                    debug!("🕰️ Expired registrations: {}", registration_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running stale registration expiry job: {e}");
                },
            }
        }
    })
}

fn registration_list(expired: &[ExpiredRegistration]) -> String {
    expired
        .iter()
        .map(|e| {
            let r = &e.registration;
            format!("[{}] sport: {} user: {}", r.id, r.sport_id, r.user_id)
        })
        .collect::<Vec<String>>()
        .join(", ")
}
