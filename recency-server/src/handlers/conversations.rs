use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use recency_shared::models::{
    ConversationListResponse, ConversationSummary, CreateConversationRequest, PersistedMessage,
    RecomputeSummaryRequest, RenameConversationRequest,
};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    http::error::{ApiError, AppResult},
};

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

#[utoipa::path(
    post,
    path = "/api/conversations",
    request_body = CreateConversationRequest,
    responses(
        (status = 201, description = "Conversation created", body = ConversationSummary),
        (status = 400, description = "Invalid title", body = crate::http::problem::ProblemDetails)
    ),
    tag = "Conversations"
)]
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateConversationRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ConversationSummary>)> {
    let request = body(payload)?;
    let summary = state
        .conversations
        .create(&request.title, request.participant_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

#[utoipa::path(
    get,
    path = "/api/conversations/{id}",
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Conversation summary", body = ConversationSummary),
        (status = 404, description = "Unknown conversation", body = crate::http::problem::ProblemDetails)
    ),
    tag = "Conversations"
)]
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ConversationSummary>> {
    Ok(Json(state.conversations.get(id).await?))
}

#[utoipa::path(
    patch,
    path = "/api/conversations/{id}",
    params(("id" = Uuid, Path, description = "Conversation id")),
    request_body = RenameConversationRequest,
    responses(
        (status = 200, description = "Renamed summary", body = ConversationSummary),
        (status = 400, description = "Invalid title", body = crate::http::problem::ProblemDetails),
        (status = 404, description = "Unknown conversation", body = crate::http::problem::ProblemDetails),
        (status = 409, description = "Too much contention", body = crate::http::problem::ProblemDetails)
    ),
    tag = "Conversations"
)]
pub async fn rename_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<RenameConversationRequest>, JsonRejection>,
) -> AppResult<Json<ConversationSummary>> {
    let request = body(payload)?;
    Ok(Json(state.conversations.rename(id, &request.title).await?))
}

/// Inbound hook for the message store, called once a message is durable.
#[utoipa::path(
    post,
    path = "/api/conversations/{id}/messages",
    params(("id" = Uuid, Path, description = "Conversation id")),
    request_body = PersistedMessage,
    responses(
        (status = 200, description = "Summary after the message was applied", body = ConversationSummary),
        (status = 400, description = "Message belongs to another conversation", body = crate::http::problem::ProblemDetails),
        (status = 404, description = "Unknown conversation", body = crate::http::problem::ProblemDetails),
        (status = 409, description = "Too much contention", body = crate::http::problem::ProblemDetails)
    ),
    tag = "Summaries"
)]
pub async fn message_persisted(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<PersistedMessage>, JsonRejection>,
) -> AppResult<Json<ConversationSummary>> {
    let message = body(payload)?;
    Ok(Json(
        state.synchronizer.on_message_persisted(id, &message).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/conversations/{id}/recompute",
    params(("id" = Uuid, Path, description = "Conversation id")),
    request_body = RecomputeSummaryRequest,
    responses(
        (status = 200, description = "Rebuilt summary", body = ConversationSummary),
        (status = 400, description = "Message belongs to another conversation", body = crate::http::problem::ProblemDetails),
        (status = 404, description = "Unknown conversation", body = crate::http::problem::ProblemDetails)
    ),
    tag = "Summaries"
)]
pub async fn recompute_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<RecomputeSummaryRequest>, JsonRejection>,
) -> AppResult<Json<ConversationSummary>> {
    let request = body(payload)?;
    Ok(Json(
        state
            .synchronizer
            .recompute(id, request.latest.as_ref())
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}/conversations",
    params(("user_id" = Uuid, Path, description = "Participant id")),
    responses(
        (status = 200, description = "Conversations, most recent first", body = ConversationListResponse)
    ),
    tag = "Conversations"
)]
pub async fn list_user_conversations(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ConversationListResponse>> {
    let conversations = state.lister.list(user_id).await?;
    Ok(Json(ConversationListResponse { conversations }))
}
