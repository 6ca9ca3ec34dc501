use fest_registration_engine::events::{
    EventHandlers,
    EventHooks,
    RegistrationAnnulledEvent,
    RegistrationConfirmedEvent,
};
use log::*;

pub const EVENT_BUFFER_SIZE: usize = 25;

/// Creates the event handlers the server subscribes to the engine.
///
/// 1. RegistrationConfirmedEvent - a participant has paid and holds a confirmed place.
/// 2. RegistrationAnnulledEvent - a registration was cancelled, refunded, expired or its payment failed.
///
/// Both hooks only write to the log for now. They are the place to send confirmation or cancellation emails from.
pub fn create_event_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_registration_confirmed(|ev| {
        let RegistrationConfirmedEvent { registration, payment, actor } = ev;
        Box::pin(async move {
            info!(
                "🎟️ Registration #{} of {} for sport #{} is confirmed. {} paid by {} (order {}), confirmed by {actor}",
                registration.id,
                registration.user_id,
                registration.sport_id,
                payment.amount,
                payment.method,
                payment.order_id
            );
        })
    });
    hooks.on_registration_annulled(|ev| {
        let RegistrationAnnulledEvent { registration, reason, slot_released } = ev;
        Box::pin(async move {
            info!(
                "🎟️ Registration #{} of {} for sport #{} annulled ({reason:?}). Slot released: {slot_released}",
                registration.id, registration.user_id, registration.sport_id
            );
        })
    });
    EventHandlers::new(EVENT_BUFFER_SIZE, hooks)
}
