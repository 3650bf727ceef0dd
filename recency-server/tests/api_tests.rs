//! End-to-end tests against the full router backed by the in-memory store.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use recency_server::{app_state::AppState, server};
use recency_shared::{
    config::server::{Config, Profile},
    models::{ConversationListResponse, ConversationSummary},
};
use serde_json::{Value, json};
use uuid::Uuid;

fn test_server() -> TestServer {
    let state = AppState::in_memory(Config::default_for_profile(Profile::Test));
    let app = server::create_app_router(Arc::new(state), server::metrics_handle());
    TestServer::new(app).unwrap()
}

async fn create(server: &TestServer, title: &str, user: Uuid) -> ConversationSummary {
    let response = server
        .post("/api/conversations")
        .json(&json!({ "title": title, "participant_ids": [user] }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json()
}

async fn post_message(
    server: &TestServer,
    conversation: Uuid,
    sender: Uuid,
    text: &str,
    at: &str,
) -> ConversationSummary {
    let response = server
        .post(&format!("/api/conversations/{conversation}/messages"))
        .json(&json!({
            "id": Uuid::new_v4(),
            "conversation_id": conversation,
            "sender_id": sender,
            "text": text,
            "kind": "text",
            "created_at": at,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.json()
}

async fn listing(server: &TestServer, user: Uuid) -> Vec<Uuid> {
    let response = server.get(&format!("/api/users/{user}/conversations")).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response
        .json::<ConversationListResponse>()
        .conversations
        .into_iter()
        .map(|summary| summary.id)
        .collect()
}

#[tokio::test]
async fn created_conversation_has_no_preview() {
    let server = test_server();
    let user = Uuid::new_v4();

    let summary = create(&server, "  Weekend plans  ", user).await;

    assert_eq!(summary.title, "Weekend plans");
    assert!(summary.last_message.is_none());
    assert!(summary.last_message_at.is_none());
    assert_eq!(summary.participant_ids, vec![user]);
}

#[tokio::test]
async fn persisted_message_becomes_the_preview() {
    let server = test_server();
    let user = Uuid::new_v4();
    let conversation = create(&server, "General", user).await;

    let summary = post_message(
        &server,
        conversation.id,
        user,
        "hello there",
        "2025-03-08T14:30:00Z",
    )
    .await;

    let preview = summary.last_message.clone().unwrap();
    assert_eq!(preview.text, "hello there");
    assert_eq!(summary.last_message_at, Some(preview.created_at));
    assert_eq!(summary.updated_at, preview.created_at);

    let fetched: ConversationSummary = server
        .get(&format!("/api/conversations/{}", conversation.id))
        .await
        .json();
    assert_eq!(fetched, summary);
}

#[tokio::test]
async fn late_delivery_does_not_move_recency_backwards() {
    let server = test_server();
    let user = Uuid::new_v4();
    let conversation = create(&server, "General", user).await;

    post_message(&server, conversation.id, user, "newer", "2025-03-08T14:31:00Z").await;
    let summary =
        post_message(&server, conversation.id, user, "older", "2025-03-08T14:30:00Z").await;

    let at = summary.last_message_at.unwrap();
    assert_eq!(at.0.to_rfc3339(), "2025-03-08T14:31:00+00:00");
    assert!(summary.updated_at >= at);
}

#[tokio::test]
async fn listing_puts_recent_activity_first() {
    let server = test_server();
    let user = Uuid::new_v4();
    let older = create(&server, "Older", user).await;
    let newer = create(&server, "Newer", user).await;
    let quiet = create(&server, "Quiet", user).await;

    post_message(&server, older.id, user, "first", "2025-03-08T14:30:00Z").await;
    post_message(&server, newer.id, user, "second", "2025-03-08T14:35:00Z").await;

    assert_eq!(
        listing(&server, user).await,
        vec![newer.id, older.id, quiet.id]
    );
}

#[tokio::test]
async fn conversations_without_messages_list_newest_first() {
    let server = test_server();
    let user = Uuid::new_v4();
    let first = create(&server, "First", user).await;
    let second = create(&server, "Second", user).await;

    assert_eq!(listing(&server, user).await, vec![second.id, first.id]);
}

#[tokio::test]
async fn rename_does_not_change_listing_position() {
    let server = test_server();
    let user = Uuid::new_v4();
    let stale = create(&server, "Stale", user).await;
    let active = create(&server, "Active", user).await;

    post_message(&server, stale.id, user, "old news", "2025-03-08T09:00:00Z").await;
    post_message(&server, active.id, user, "fresh", "2025-03-08T12:00:00Z").await;

    let response = server
        .patch(&format!("/api/conversations/{}", stale.id))
        .json(&json!({ "title": "Renamed" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let renamed: ConversationSummary = response.json();

    assert_eq!(renamed.title, "Renamed");
    assert_eq!(
        renamed.last_message_at.unwrap().0.to_rfc3339(),
        "2025-03-08T09:00:00+00:00"
    );
    assert_eq!(listing(&server, user).await, vec![active.id, stale.id]);
}

#[tokio::test]
async fn listing_is_scoped_to_the_participant() {
    let server = test_server();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let mine = create(&server, "Mine", alice).await;
    create(&server, "Theirs", bob).await;

    assert_eq!(listing(&server, alice).await, vec![mine.id]);
    assert!(listing(&server, Uuid::new_v4()).await.is_empty());
}

#[tokio::test]
async fn recompute_without_messages_clears_the_preview() {
    let server = test_server();
    let user = Uuid::new_v4();
    let conversation = create(&server, "General", user).await;
    post_message(&server, conversation.id, user, "gone soon", "2025-03-08T14:30:00Z").await;

    let response = server
        .post(&format!("/api/conversations/{}/recompute", conversation.id))
        .json(&json!({}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let summary: ConversationSummary = response.json();

    assert!(summary.last_message.is_none());
    assert_eq!(
        summary.last_message_at.unwrap().0.to_rfc3339(),
        "2025-03-08T14:30:00+00:00"
    );
}

#[tokio::test]
async fn unknown_conversation_is_a_problem_document() {
    let server = test_server();

    let response = server
        .get(&format!("/api/conversations/{}", Uuid::new_v4()))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.header("content-type").to_str().unwrap(),
        "application/problem+json"
    );
    let body: Value = response.json();
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn empty_title_is_rejected() {
    let server = test_server();

    let response = server
        .post("/api/conversations")
        .json(&json!({ "title": "   " }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "validation_failed");
}

#[tokio::test]
async fn message_for_another_conversation_is_rejected() {
    let server = test_server();
    let user = Uuid::new_v4();
    let conversation = create(&server, "General", user).await;

    let response = server
        .post(&format!("/api/conversations/{}/messages", conversation.id))
        .json(&json!({
            "id": Uuid::new_v4(),
            "conversation_id": Uuid::new_v4(),
            "sender_id": user,
            "text": "misrouted",
            "kind": "text",
            "created_at": "2025-03-08T14:30:00Z",
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let unchanged: ConversationSummary = server
        .get(&format!("/api/conversations/{}", conversation.id))
        .await
        .json();
    assert!(unchanged.last_message.is_none());
}

#[tokio::test]
async fn stream_for_unknown_conversation_is_not_found() {
    let server = test_server();

    let response = server
        .get(&format!("/api/conversations/{}/stream", Uuid::new_v4()))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let server = test_server();

    server.get("/healthz").await.assert_status_ok();
    server.get("/readyz").await.assert_status_ok();

    let document: Value = server.get("/openapi/recency.json").await.json();
    assert!(document["paths"]["/api/conversations/{id}/messages"].is_object());
    assert!(document["paths"]["/api/users/{user_id}/conversations"].is_object());
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let server = test_server();

    let response = server
        .get("/healthz")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("req-123"),
        )
        .await;

    assert_eq!(
        response.header("x-request-id").to_str().unwrap(),
        "req-123"
    );
}
