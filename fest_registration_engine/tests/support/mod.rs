#![allow(dead_code)]
use fest_common::Secret;
use fest_registration_engine::{
    db_types::{NewRegistration, NewSport, OrderId, Paise, Payment, Registration, Sport, UserId},
    events::EventProducers,
    helpers::sign_checkout,
    reconciliation_objects::PaymentVerification,
    test_utils::prepare_env::{drop_database, prepare_test_env, random_db_path},
    AdminApi,
    RegistrationDatabase,
    ReconciliationApi,
    ReservationApi,
    SqliteDatabase,
};
use log::*;

pub const KEY_SECRET: &str = "rzp_test_key_secret";

pub struct TestSystem {
    pub url: String,
    pub db: SqliteDatabase,
    pub reservations: ReservationApi<SqliteDatabase, SqliteDatabase>,
    pub reconciliation: ReconciliationApi<SqliteDatabase, SqliteDatabase>,
    pub admin: AdminApi<SqliteDatabase, SqliteDatabase>,
}

impl TestSystem {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default(), false).await
    }

    pub async fn with_producers(producers: EventProducers, release_slot_on_refund: bool) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 10).await.expect("Error creating database");
        let reservations = ReservationApi::new(db.clone(), db.clone());
        let reconciliation =
            ReconciliationApi::new(db.clone(), db.clone(), producers.clone(), Secret::new(KEY_SECRET.to_string()))
                .with_refund_slot_release(release_slot_on_refund);
        let admin = AdminApi::new(db.clone(), db.clone(), producers);
        Self { url, db, reservations, reconciliation, admin }
    }

    pub async fn add_sport(&self, slug: &str, max_slots: i64, fee_rupees: i64) -> Sport {
        let sport = NewSport::new(slug, slug, max_slots, Paise::from_rupees(fee_rupees));
        self.admin.create_sport(sport, &admin()).await.expect("Error creating sport")
    }

    pub async fn sport(&self, sport_id: i64) -> Sport {
        self.reservations.sport(sport_id).await.expect("Error fetching sport")
    }

    pub async fn registration(&self, id: i64) -> Registration {
        self.reservations.registration(id).await.expect("Error fetching registration").registration
    }

    pub async fn payment(&self, registration_id: i64) -> Option<Payment> {
        self.db.fetch_payment_for_registration(registration_id).await.expect("Error fetching payment")
    }

    /// Reserves a slot for `user` and opens the gateway order `order_<registration id>` against it.
    pub async fn reserve_with_order(&self, user: &str, sport: &Sport) -> (Registration, Payment) {
        let registration = self
            .reservations
            .reserve(NewRegistration::new(user, sport.id))
            .await
            .expect("Error reserving a slot");
        let order_id = OrderId::from(format!("order_{}", registration.id));
        let payment = self
            .reservations
            .attach_payment_order(&registration.user_id, registration.id, order_id, sport.fee)
            .await
            .expect("Error attaching the payment order");
        (registration, payment)
    }

    pub async fn tear_down(self) {
        let mut db = self.db;
        if let Err(e) = db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        drop_database(&self.url).await;
    }
}

pub fn admin() -> UserId {
    UserId::from("admin_1")
}

pub fn verification(order_id: &OrderId, payment_id: &str) -> PaymentVerification {
    let signature = sign_checkout(KEY_SECRET, order_id.as_str(), payment_id).expect("Error signing checkout");
    PaymentVerification::new(order_id.clone(), payment_id.to_string(), signature)
}
