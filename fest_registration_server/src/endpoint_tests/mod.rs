mod admin;
mod helpers;
mod payments;
mod registrations;
