//! Domain models shared by the server and its clients.

/// Conversation summaries and their request bodies.
pub mod conversation;
/// Persisted messages as delivered by the message store.
pub mod message;
/// Change notification events.
pub mod streaming;
/// UTC instants.
pub mod timestamp;

pub use conversation::{
    ConversationListResponse, ConversationSummary, CreateConversationRequest, LastMessage,
    RecomputeSummaryRequest, RenameConversationRequest,
};
pub use message::{MessageKind, PersistedMessage};
pub use streaming::{StreamErrorEvent, SummaryStreamEvent};
pub use timestamp::Timestamp;
