use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{MessageKind, PersistedMessage, Timestamp};

/// Denormalized attributes of the latest message of a conversation.
///
/// The summary only holds a non-owning reference (`message_id`) to the
/// message; the message store owns the message itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct LastMessage {
    /// Id of the referenced message.
    pub message_id: Uuid,
    /// Preview text.
    pub text: String,
    /// Author of the message.
    pub sender_id: Uuid,
    /// Content kind, for rendering the preview.
    pub kind: MessageKind,
    /// Creation instant of the referenced message.
    pub created_at: Timestamp,
}

impl LastMessage {
    /// Ordering key compatible with [`PersistedMessage::recency_key`].
    #[must_use]
    pub fn recency_key(&self) -> (Timestamp, Uuid) {
        (self.created_at, self.message_id)
    }
}

impl From<&PersistedMessage> for LastMessage {
    fn from(message: &PersistedMessage) -> Self {
        Self {
            message_id: message.id,
            text: message.text.clone(),
            sender_id: message.sender_id,
            kind: message.kind,
            created_at: message.created_at,
        }
    }
}

/// Per-conversation record used for listing and sorting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ConversationSummary {
    /// Conversation id.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Users the conversation is listed for.
    pub participant_ids: Vec<Uuid>,
    /// Preview of the latest message by creation order; `None` until the
    /// conversation has a message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    /// Recency of the conversation. The only field listings sort on, and it
    /// never decreases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<Timestamp>,
    /// Last modification of the record itself. Audit only, never a sort key.
    pub updated_at: Timestamp,
    /// Creation of the conversation.
    pub created_at: Timestamp,
    /// Insertion order, unique and strictly increasing. Breaks ties between
    /// equal `last_message_at` values.
    pub sequence: i64,
    /// Optimistic concurrency token, bumped on every committed write.
    pub revision: i64,
}

impl ConversationSummary {
    /// Whether the given user takes part in this conversation.
    #[must_use]
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participant_ids.contains(&user_id)
    }
}

/// Request structure for creating a new conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct CreateConversationRequest {
    /// Title, trimmed before use.
    pub title: String,
    /// Initial participants.
    #[serde(default)]
    pub participant_ids: Vec<Uuid>,
}

/// Request structure for renaming a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct RenameConversationRequest {
    /// New title, trimmed before use.
    pub title: String,
}

/// Request structure for rebuilding a summary after the latest message was
/// deleted or edited. `latest` is the latest message still present, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct RecomputeSummaryRequest {
    /// Latest surviving message; absent when none is left.
    #[serde(default)]
    pub latest: Option<PersistedMessage>,
}

/// Ordered conversation listing for a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ConversationListResponse {
    /// Summaries, most recent first.
    pub conversations: Vec<ConversationSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn summary() -> ConversationSummary {
        let at = Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap());
        ConversationSummary {
            id: Uuid::from_u128(7),
            title: "Sample Chat".into(),
            participant_ids: vec![Uuid::from_u128(1)],
            last_message: None,
            last_message_at: None,
            updated_at: at,
            created_at: at,
            sequence: 1,
            revision: 0,
        }
    }

    #[test]
    fn empty_summary_omits_message_fields() {
        let value = serde_json::to_value(summary()).unwrap();

        assert!(value.get("last_message").is_none());
        assert!(value.get("last_message_at").is_none());
        assert_eq!(value["sequence"], 1);
    }

    #[test]
    fn last_message_copies_message_attributes() {
        let message = PersistedMessage {
            id: Uuid::from_u128(3),
            conversation_id: Uuid::from_u128(7),
            sender_id: Uuid::from_u128(1),
            text: "hello".into(),
            kind: MessageKind::Text,
            created_at: summary().created_at,
        };

        let preview = LastMessage::from(&message);
        assert_eq!(preview.message_id, message.id);
        assert_eq!(preview.text, "hello");
        assert_eq!(preview.recency_key(), message.recency_key());
    }

    #[test]
    fn has_participant_checks_membership() {
        let summary = summary();
        assert!(summary.has_participant(Uuid::from_u128(1)));
        assert!(!summary.has_participant(Uuid::from_u128(2)));
    }

    #[test]
    fn create_request_defaults_participants() {
        let request: CreateConversationRequest =
            serde_json::from_str(r#"{"title":"Team"}"#).unwrap();
        assert!(request.participant_ids.is_empty());
    }
}
