//! Per-request spans, tagged with the request id and the conversation or
//! user the request addresses.

use std::time::Duration;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{Request, Response},
};
use tower_http::classify::{ServerErrorsAsFailures, ServerErrorsFailureClass, SharedClassifier};
use tower_http::trace::{DefaultOnBodyChunk, DefaultOnEos, MakeSpan, TraceLayer};
use tracing::{Span, error, field, info};
use uuid::Uuid;

use crate::middleware::request_context::RequestContext;

type TraceLayerType = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    RequestSpan,
    fn(&Request<Body>, &Span),
    fn(&Response<Body>, Duration, &Span),
    DefaultOnBodyChunk,
    DefaultOnEos,
    fn(ServerErrorsFailureClass, Duration, &Span),
>;

/// The UUID in the segment after `collection`, e.g. the `{id}` of
/// `/api/conversations/{id}/messages`.
fn id_after(path: &str, collection: &str) -> Option<Uuid> {
    let mut segments = path.split('/');
    segments.find(|segment| *segment == collection)?;
    segments.next()?.parse().ok()
}

#[derive(Clone, Debug, Default)]
pub(crate) struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .extensions()
            .get::<RequestContext>()
            .map_or("n/a", |ctx| ctx.request_id.as_str());
        let path = request.uri().path();
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map_or(path, MatchedPath::as_str);

        let span = tracing::info_span!(
            "recency_request",
            method = %request.method(),
            route = %route,
            request_id = %request_id,
            conversation_id = field::Empty,
            user_id = field::Empty,
            status = field::Empty,
        );
        if let Some(id) = id_after(path, "conversations") {
            span.record("conversation_id", field::display(id));
        }
        if let Some(id) = id_after(path, "users") {
            span.record("user_id", field::display(id));
        }
        span
    }
}

fn on_request_handler(req: &Request<Body>, span: &Span) {
    span.in_scope(|| {
        info!(uri = %req.uri(), "started processing request");
    });
}

fn on_response_handler(response: &Response<Body>, latency: Duration, span: &Span) {
    span.record("status", response.status().as_u16());
    span.in_scope(|| {
        info!(latency = ?latency, "finished processing request");
    });
}

fn on_failure_handler(error: ServerErrorsFailureClass, latency: Duration, span: &Span) {
    span.in_scope(|| {
        error!(error = %error, latency = ?latency, "error processing request");
    });
}

pub fn create_trace_layer() -> TraceLayerType {
    TraceLayer::new_for_http()
        .make_span_with(RequestSpan)
        .on_request(on_request_handler as fn(&Request<Body>, &Span))
        .on_response(on_response_handler as fn(&Response<Body>, Duration, &Span))
        .on_failure(on_failure_handler as fn(ServerErrorsFailureClass, Duration, &Span))
}
