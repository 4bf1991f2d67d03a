use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use citybite_core::Actor;
use citybite_shared::{Audience, NotificationEvent};
use futures_util::stream::{Stream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;

use crate::state::AppState;

/// GET /v1/events/stream
/// Pushes the caller's notifications as they are dispatched. Lagged events are
/// dropped; clients re-read the order to catch up.
pub async fn event_stream(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.notifications.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let actor = actor.clone();
        async move {
            match result {
                Ok(event) if is_recipient(&actor, &event) => Event::default()
                    .event(event.kind.as_str())
                    .id(event.id.to_string())
                    .json_data(&event)
                    .ok()
                    .map(Ok),
                _ => None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub fn is_recipient(actor: &Actor, event: &NotificationEvent) -> bool {
    match (actor, &event.audience) {
        (Actor::Operator { .. }, _) => true,
        (Actor::Customer { id }, Audience::Customer(target)) => id == target,
        (Actor::Restaurant { id }, Audience::Restaurant(target)) => id == target,
        (Actor::Rider { id, .. }, Audience::Rider(target)) => id == target,
        (Actor::Rider { .. }, Audience::Riders) => true,
        _ => false,
    }
}
