//! # Fest registration server
//! This crate hosts the HTTP server for festival sport registrations. It is responsible for:
//! * Authenticating participants and organisers with bearer tokens.
//! * Reserving capacity-limited places in sports and opening payment orders for them.
//! * Reconciling payments from checkout verification, gateway webhooks and manual confirmation.
//! * Exposing the organiser tools: sport management, cancellations, statistics and the audit log.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/sports` and `/sports/{id}`: The public sport catalogue.
//! * `/api/...`: Participant and organiser routes. A valid bearer token is required.
//! * `/webhooks/razorpay`: Payment gateway notifications. Requests must carry a valid HMAC signature.

pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod event_hooks;
pub mod expiry_worker;
pub mod gateway;
pub mod helpers;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
