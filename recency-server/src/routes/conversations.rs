use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tracing::info;

use crate::{
    app_state::AppState,
    handlers::{conversations, streaming},
};

/// Routes mounted under `/api`.
pub fn create_router_conversations() -> Router<Arc<AppState>> {
    info!("Creating conversation router");
    Router::new()
        .route("/conversations", post(conversations::create_conversation))
        .route(
            "/conversations/{id}",
            get(conversations::get_conversation).patch(conversations::rename_conversation),
        )
        .route(
            "/conversations/{id}/messages",
            post(conversations::message_persisted),
        )
        .route(
            "/conversations/{id}/recompute",
            post(conversations::recompute_summary),
        )
        .route(
            "/conversations/{id}/stream",
            get(streaming::stream_conversation),
        )
        .route(
            "/users/{user_id}/conversations",
            get(conversations::list_user_conversations),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_router_conversations() {
        let router = create_router_conversations();
        assert!(router.has_routes(), "Router should not be empty");
    }
}
