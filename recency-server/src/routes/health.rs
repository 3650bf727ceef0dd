use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use serde::Serialize;
use tracing::warn;

use crate::app_state::AppState;

#[derive(Serialize)]
struct HealthResponse<'a> {
    status: &'a str,
}

async fn healthz() -> impl IntoResponse {
    metrics::counter!("health_checks_total", "endpoint" => "healthz", "status" => "ok")
        .increment(1);
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => {
            metrics::counter!("health_checks_total", "endpoint" => "readyz", "status" => "ok")
                .increment(1);
            (StatusCode::OK, Json(HealthResponse { status: "ready" }))
        }
        Err(err) => {
            warn!(error = %err, "readiness probe failed");
            metrics::counter!("health_checks_total", "endpoint" => "readyz", "status" => "error")
                .increment(1);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse { status: "degraded" }),
            )
        }
    }
}

pub fn create_health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::SystemClock,
        services::{SealedWrite, SummaryError, SummaryResult, SummaryStore},
    };
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use recency_shared::{
        config::server::{Config, Profile},
        models::ConversationSummary,
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    #[derive(Debug)]
    struct DownStore;

    #[async_trait]
    impl SummaryStore for DownStore {
        async fn insert(
            &self,
            _conversation: crate::services::NewConversation,
        ) -> SummaryResult<ConversationSummary> {
            Err(SummaryError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn fetch(&self, _id: Uuid) -> SummaryResult<Option<ConversationSummary>> {
            Err(SummaryError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn commit(
            &self,
            _id: Uuid,
            _write: SealedWrite,
        ) -> SummaryResult<ConversationSummary> {
            Err(SummaryError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn list_for_participant(
            &self,
            _user: Uuid,
        ) -> SummaryResult<Vec<ConversationSummary>> {
            Err(SummaryError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn ping(&self) -> SummaryResult<()> {
            Err(SummaryError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    async fn status_of(state: AppState, uri: &str) -> StatusCode {
        create_health_router()
            .with_state(Arc::new(state))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let state = AppState::in_memory(Config::default_for_profile(Profile::Test));
        assert_eq!(status_of(state, "/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_returns_ready_for_reachable_store() {
        let state = AppState::in_memory(Config::default_for_profile(Profile::Test));
        assert_eq!(status_of(state, "/readyz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_returns_service_unavailable_when_store_fails() {
        let state = AppState::new(
            Config::default_for_profile(Profile::Test),
            Arc::new(DownStore),
            Arc::new(SystemClock),
        );
        assert_eq!(
            status_of(state, "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
