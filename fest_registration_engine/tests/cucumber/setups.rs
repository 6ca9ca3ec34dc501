use cucumber::given;
use fest_registration_engine::db_types::{NewSport, Paise, UserId};

use crate::cucumber::{RegistrationSystem, RegistrationWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut RegistrationWorld) {
    let system = RegistrationSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "a sport {word} with {int} slots and a fee of {int} rupees")]
async fn add_sport(world: &mut RegistrationWorld, slug: String, slots: i64, fee: i64) {
    let sport = NewSport::new(slug.clone(), slug, slots, Paise::from_rupees(fee));
    world.system().admin.create_sport(sport, &UserId::from("admin")).await.expect("Error creating sport");
}

#[given(expr = "registration for {word} is closed")]
async fn close_registration(world: &mut RegistrationWorld, slug: String) {
    let sport = world.sport(&slug).await;
    world
        .system()
        .admin
        .set_registration_open(sport.id, false, &UserId::from("admin"))
        .await
        .expect("Error closing registration");
}
