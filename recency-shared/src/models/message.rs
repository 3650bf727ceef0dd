use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Timestamp;

/// The kind of content a message carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// An image attachment.
    Image,
    /// Any other attachment.
    File,
    /// Generated by the system rather than a participant.
    System,
}

impl MessageKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::System => "system",
        }
    }
}

impl TryFrom<&str> for MessageKind {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            "system" => Ok(Self::System),
            _ => Err("invalid message kind"),
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message that the message store has already durably written.
///
/// `created_at` is stamped once by the message store at write time and never
/// changes afterwards; it is the only instant the summary is derived from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct PersistedMessage {
    /// Message id.
    pub id: Uuid,
    /// Conversation the message was written to.
    pub conversation_id: Uuid,
    /// Author.
    pub sender_id: Uuid,
    /// Body; empty for attachments without a caption.
    #[serde(default)]
    pub text: String,
    /// Content kind.
    pub kind: MessageKind,
    /// Write instant assigned by the message store.
    pub created_at: Timestamp,
}

impl PersistedMessage {
    /// Ordering key used to decide which message is the latest: creation
    /// instant first, message id as a deterministic tiebreaker.
    #[must_use]
    pub fn recency_key(&self) -> (Timestamp, Uuid) {
        (self.created_at, self.id)
    }

    /// A copy whose `created_at` is truncated to the summary store's
    /// precision.
    #[must_use]
    pub fn at_storage_precision(&self) -> Self {
        Self {
            created_at: self.created_at.at_storage_precision(),
            ..self.clone()
        }
    }
}
