use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::Stream;
use tokio_stream::{
    StreamExt,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{app_state::AppState, http::error::AppResult, services::HubEvent};

fn to_sse(event: &HubEvent) -> Event {
    let data = serde_json::to_string(&event.event).unwrap_or_else(|err| {
        warn!(error = %err, "failed to encode stream event");
        r#"{"type":"error","payload":{"code":"serialization_failed","message":"event could not be encoded"}}"#
            .to_string()
    });

    let builder = Event::default().event(event.event.event_name()).data(data);
    match &event.id {
        Some(id) => builder.id(id),
        None => builder,
    }
}

/// Live summary updates for one conversation. Honors `Last-Event-ID` for
/// resumption.
#[utoipa::path(
    get,
    path = "/api/conversations/{id}/stream",
    params(
        ("id" = Uuid, Path, description = "Conversation id"),
        ("Last-Event-ID" = Option<String>, Header, description = "Resume after this event id")
    ),
    responses(
        (status = 200, description = "text/event-stream of summary.updated and error events", content_type = "text/event-stream"),
        (status = 404, description = "Unknown conversation", body = crate::http::problem::ProblemDetails)
    ),
    tag = "Summaries"
)]
pub async fn stream_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    state.conversations.get(conversation_id).await?;

    let last_event_id = headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim);

    let subscription = state.hub.subscribe(conversation_id, last_event_id).await;
    info!(
        %conversation_id,
        replay = subscription.backlog.len(),
        "summary stream opened"
    );

    let live = BroadcastStream::new(subscription.receiver).map(move |item| match item {
        Ok(event) => event,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(%conversation_id, skipped, "summary stream subscriber lagged");
            HubEvent::error(
                "lagged",
                format!("{skipped} events were dropped; the next summary is complete"),
            )
        }
    });

    let stream = tokio_stream::iter(subscription.backlog)
        .chain(live)
        .map(|event| Ok::<_, Infallible>(to_sse(&event)));

    let keepalive = KeepAlive::new()
        .interval(Duration::from_secs(state.config.stream.heartbeat_seconds.max(1)))
        .text("keep-alive");

    Ok(Sse::new(stream).keep_alive(keepalive))
}
