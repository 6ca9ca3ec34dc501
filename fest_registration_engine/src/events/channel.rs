//! Event channels between the engine APIs and the server's hooks.
//!
//! Every [`RegistrationConfirmedEvent`](super::RegistrationConfirmedEvent) and
//! [`RegistrationAnnulledEvent`](super::RegistrationAnnulledEvent) that the reconciliation and admin APIs publish goes
//! through one bounded channel per event type. An [`EventHandler`] owns the receiving end and runs the hook once per
//! event on its own task. Hooks only ever see the event, never the database, so a slow or failing hook cannot hold up
//! or roll back the state change that produced it.
//!
//! A handler stops once every [`EventProducer`] subscribed to it has been dropped, after the hooks that are still
//! running have finished.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    pub async fn start_handler(self) {
        let Self { mut listener, sender, handler } = self;
        let event_name = short_type_name::<E>();
        debug!("🎟️ Starting {event_name} handler");
        // Only producers may keep the channel open
        drop(sender);
        let mut hooks = JoinSet::new();
        while let Some(ev) = listener.recv().await {
            trace!("🎟️ Handling {event_name}");
            hooks.spawn((handler)(ev));
            // Reap finished hooks as we go so the set does not grow with the event count
            while let Some(done) = hooks.try_join_next() {
                log_hook_result(event_name, done);
            }
        }
        if !hooks.is_empty() {
            debug!("🎟️ Waiting for {} {event_name} hooks to complete", hooks.len());
        }
        while let Some(done) = hooks.join_next().await {
            log_hook_result(event_name, done);
        }
        debug!("🎟️ {event_name} handler has shut down");
    }
}

fn log_hook_result(event_name: &str, result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => trace!("🎟️ {event_name} handled"),
        Err(e) => warn!("🎟️ A {event_name} hook did not complete. {e}"),
    }
}

fn short_type_name<E>() -> &'static str {
    let name = std::any::type_name::<E>();
    name.rsplit("::").next().unwrap_or(name)
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Waits for room in the channel. An event is dropped, with an error log, only when its handler has shut down.
    pub async fn publish_event(&self, event: E) {
        if self.sender.send(event).await.is_err() {
            error!("🎟️ The {} handler has shut down. Event dropped", short_type_name::<E>());
        }
    }
}
