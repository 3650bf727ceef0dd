#![allow(clippy::needless_for_each)] // Derive macro emits a for_each internally

//! OpenAPI document for the HTTP surface.

use recency_shared::models::{
    ConversationListResponse, ConversationSummary, CreateConversationRequest, LastMessage,
    MessageKind, PersistedMessage, RecomputeSummaryRequest, RenameConversationRequest,
    StreamErrorEvent, SummaryStreamEvent, Timestamp,
};
use utoipa::OpenApi;

use crate::http::problem::ProblemDetails;

/// The recency OpenAPI document.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "Recency API",
        version = "1.0.0",
        description = "Conversation summary synchronization and ordered listings"
    ),
    paths(
        crate::handlers::conversations::create_conversation,
        crate::handlers::conversations::get_conversation,
        crate::handlers::conversations::rename_conversation,
        crate::handlers::conversations::message_persisted,
        crate::handlers::conversations::recompute_summary,
        crate::handlers::conversations::list_user_conversations,
        crate::handlers::streaming::stream_conversation,
    ),
    components(
        schemas(
            ConversationSummary,
            LastMessage,
            MessageKind,
            PersistedMessage,
            Timestamp,
            CreateConversationRequest,
            RenameConversationRequest,
            RecomputeSummaryRequest,
            ConversationListResponse,
            SummaryStreamEvent,
            StreamErrorEvent,
            ProblemDetails,
        )
    ),
    tags(
        (name = "Conversations", description = "Conversation lifecycle and listings"),
        (name = "Summaries", description = "Summary synchronization and live updates")
    )
)]
pub struct ApiDoc;
