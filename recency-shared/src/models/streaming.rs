use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ConversationSummary;

/// Payload of an `error` stream event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct StreamErrorEvent {
    /// Machine readable code, e.g. `stale_cursor` or `lagged`.
    pub code: String,
    /// Human readable explanation.
    pub message: String,
}

/// Events pushed to sessions subscribed to a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SummaryStreamEvent {
    /// A summary change was committed.
    #[serde(rename = "summary.updated")]
    SummaryUpdated {
        /// The committed summary.
        payload: ConversationSummary,
    },
    /// The stream could not deliver what the client expected.
    #[serde(rename = "error")]
    Error {
        /// What went wrong.
        payload: StreamErrorEvent,
    },
}

impl SummaryStreamEvent {
    /// SSE event name for this event.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::SummaryUpdated { .. } => "summary.updated",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_event_is_tagged_with_type() {
        let event = SummaryStreamEvent::Error {
            payload: StreamErrorEvent {
                code: "stale_cursor".into(),
                message: "history gone".into(),
            },
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["payload"]["code"], "stale_cursor");
        assert_eq!(event.event_name(), "error");
    }
}
