use std::sync::Arc;

use crate::{app_state::AppState, openapi::ApiDoc};
use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use utoipa::OpenApi;

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

async fn openapi_yaml() -> impl IntoResponse {
    match ApiDoc::openapi().to_yaml() {
        Ok(yaml) => (StatusCode::OK, yaml),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("YAML error: {e}"),
        ),
    }
}

pub fn openapi_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/openapi/recency.json", get(openapi_json))
        .route("/openapi/recency.yaml", get(openapi_yaml))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use recency_shared::config::server::{Config, Profile};
    use tower::ServiceExt;

    async fn fetch(uri: &str) -> (StatusCode, String) {
        let state = Arc::new(AppState::in_memory(Config::default_for_profile(Profile::Test)));
        let response = openapi_routes()
            .with_state(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn json_document_lists_summary_paths() {
        let (status, body) = fetch("/openapi/recency.json").await;
        assert_eq!(status, StatusCode::OK);

        let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
        let paths = doc["paths"].as_object().unwrap();
        assert!(paths.contains_key("/api/conversations/{id}/messages"));
        assert!(paths.contains_key("/api/users/{user_id}/conversations"));
        assert!(doc["components"]["schemas"]["ConversationSummary"].is_object());
    }

    #[tokio::test]
    async fn yaml_document_is_served() {
        let (status, body) = fetch("/openapi/recency.yaml").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("openapi:"));
    }
}
