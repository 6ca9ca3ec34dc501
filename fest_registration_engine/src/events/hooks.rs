use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{EventHandler, EventProducer, Handler, RegistrationAnnulledEvent, RegistrationConfirmedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub registration_confirmed_producer: Vec<EventProducer<RegistrationConfirmedEvent>>,
    pub registration_annulled_producer: Vec<EventProducer<RegistrationAnnulledEvent>>,
}

impl EventProducers {
    pub async fn publish_registration_confirmed(&self, event: RegistrationConfirmedEvent) {
        for emitter in &self.registration_confirmed_producer {
            trace!("🎟️ Notifying registration confirmed hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_registration_annulled(&self, event: RegistrationAnnulledEvent) {
        for emitter in &self.registration_annulled_producer {
            trace!("🎟️ Notifying registration annulled hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_registration_confirmed: Option<EventHandler<RegistrationConfirmedEvent>>,
    pub on_registration_annulled: Option<EventHandler<RegistrationAnnulledEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_registration_confirmed = hooks.on_registration_confirmed.map(|f| EventHandler::new(buffer_size, f));
        let on_registration_annulled = hooks.on_registration_annulled.map(|f| EventHandler::new(buffer_size, f));
        Self { on_registration_confirmed, on_registration_annulled }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_registration_confirmed {
            result.registration_confirmed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_registration_annulled {
            result.registration_annulled_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_registration_confirmed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_registration_annulled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_registration_confirmed: Option<Handler<RegistrationConfirmedEvent>>,
    pub on_registration_annulled: Option<Handler<RegistrationAnnulledEvent>>,
}

impl EventHooks {
    pub fn on_registration_confirmed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RegistrationConfirmedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_registration_confirmed = Some(Arc::new(f));
        self
    }

    pub fn on_registration_annulled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RegistrationAnnulledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_registration_annulled = Some(Arc::new(f));
        self
    }
}
