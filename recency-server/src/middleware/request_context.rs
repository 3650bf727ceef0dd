use std::str::FromStr;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use recency_shared::config::server::Config;
use uuid::Uuid;

use crate::http::error::{ApiError, AppResult};

#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub request_id: String,
}

#[derive(Clone, Debug)]
pub struct RequestIdState {
    header: HeaderName,
}

impl RequestIdState {
    pub fn from_config(config: &Config) -> Self {
        let header = HeaderName::from_str(&config.server.request_id_header)
            .unwrap_or_else(|_| HeaderName::from_static("x-request-id"));
        Self { header }
    }
}

/// Reuses the caller's request id or mints one, exposes it to handlers and
/// echoes it on the response.
pub async fn assign_request_id(
    State(state): State<RequestIdState>,
    mut request: Request<Body>,
    next: Next,
) -> AppResult<Response> {
    let request_id = extract_request_id(request.headers(), &state.header)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let value = HeaderValue::from_str(&request_id)
        .map_err(|_| ApiError::internal_server_error("failed to encode request id"))?;

    request.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });
    request
        .headers_mut()
        .insert(state.header.clone(), value.clone());

    let mut response = next.run(request).await;
    response.headers_mut().insert(state.header, value);

    Ok(response)
}

fn extract_request_id(headers: &HeaderMap, header: &HeaderName) -> Option<String> {
    headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Extension, Router, routing::get};
    use recency_shared::config::server::Profile;
    use tower::ServiceExt;

    async fn echo(Extension(context): Extension<RequestContext>) -> String {
        context.request_id
    }

    fn app() -> Router {
        let state = RequestIdState::from_config(&Config::default_for_profile(Profile::Test));
        Router::new()
            .route("/", get(echo))
            .layer(axum::middleware::from_fn_with_state(state, assign_request_id))
    }

    #[tokio::test]
    async fn propagates_incoming_request_id() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-request-id", " req-42 ")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()["x-request-id"], "req-42");
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"req-42");
    }

    #[tokio::test]
    async fn mints_request_id_when_absent() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = response.headers()["x-request-id"].to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }
}
