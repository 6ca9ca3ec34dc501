mod registration_world;
mod setups;
mod steps;

pub use registration_world::{RegistrationSystem, RegistrationWorld};
