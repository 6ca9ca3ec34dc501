use cucumber::World;
use fest_common::Secret;
use fest_registration_engine::{
    db_types::{Payment, Registration, Sport, UserId},
    events::EventProducers,
    test_utils::prepare_env::{create_database, random_db_path, run_migrations},
    AdminApi,
    ReconciliationApi,
    RegistrationDatabase,
    RegistrationError,
    ReservationApi,
    SqliteDatabase,
};
use log::*;

pub const KEY_SECRET: &str = "cucumber_key_secret";

#[derive(Default, Debug, World)]
pub struct RegistrationWorld {
    pub system: Option<RegistrationSystem>,
    pub last_error: Option<RegistrationError>,
}

#[derive(Debug)]
pub struct RegistrationSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub reservations: ReservationApi<SqliteDatabase, SqliteDatabase>,
    pub reconciliation: ReconciliationApi<SqliteDatabase, SqliteDatabase>,
    pub admin: AdminApi<SqliteDatabase, SqliteDatabase>,
}

impl RegistrationWorld {
    pub fn system(&self) -> &RegistrationSystem {
        self.system.as_ref().expect("Registration system not initialised")
    }

    /// Remembers the error of a failed request, or clears the last one on success.
    pub fn record<T>(&mut self, result: Result<T, RegistrationError>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            },
            Err(e) => {
                debug!("🥒️ Request failed: {e}");
                self.last_error = Some(e);
                None
            },
        }
    }

    pub async fn sport(&self, slug: &str) -> Sport {
        let sports = self.system().reservations.sports().await.expect("Error fetching sports");
        sports.into_iter().find(|s| s.slug == slug).unwrap_or_else(|| panic!("Sport {slug} does not exist"))
    }

    pub async fn registration(&self, user: &str, slug: &str) -> Option<Registration> {
        let sport = self.sport(slug).await;
        self.system()
            .db
            .fetch_registration_for_user(&UserId::from(user), sport.id)
            .await
            .expect("Error fetching registration")
    }

    pub async fn payment(&self, user: &str, slug: &str) -> Payment {
        let registration =
            self.registration(user, slug).await.unwrap_or_else(|| panic!("{user} is not registered for {slug}"));
        self.system()
            .db
            .fetch_payment_for_registration(registration.id)
            .await
            .expect("Error fetching payment")
            .unwrap_or_else(|| panic!("{user} has no payment for {slug}"))
    }
}

impl RegistrationSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let producers = EventProducers::default();
        let reservations = ReservationApi::new(db.clone(), db.clone());
        let reconciliation =
            ReconciliationApi::new(db.clone(), db.clone(), producers.clone(), Secret::new(KEY_SECRET.to_string()));
        let admin = AdminApi::new(db.clone(), db.clone(), producers);
        Self { db_path: url, db, reservations, reconciliation, admin }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
