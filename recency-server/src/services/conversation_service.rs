//! Conversation creation and metadata edits.

use recency_shared::models::ConversationSummary;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    guard::SummaryPatch,
    summary_store::{NewConversation, SharedSummaryStore, SummaryError, SummaryResult},
    synchronizer::SummarySynchronizer,
};
use crate::clock::SharedClock;

/// Longest accepted title, in characters.
pub const MAX_TITLE_CHARS: usize = 200;

/// Conversation lifecycle: creation and metadata edits. Message fields are
/// left to the synchronizer.
#[derive(Debug, Clone)]
pub struct ConversationService {
    store: SharedSummaryStore,
    synchronizer: SummarySynchronizer,
    clock: SharedClock,
}

fn normalize_title(title: &str) -> SummaryResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(SummaryError::Validation("title must not be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(SummaryError::Validation(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

fn dedup_participants(participant_ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut unique = Vec::with_capacity(participant_ids.len());
    for id in participant_ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}

impl ConversationService {
    /// Builds the service; renames commit through `synchronizer`.
    #[must_use]
    pub fn new(
        store: SharedSummaryStore,
        synchronizer: SummarySynchronizer,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            synchronizer,
            clock,
        }
    }

    /// Creates a conversation with no message yet.
    ///
    /// # Errors
    /// `Validation` for a bad title, or a storage failure.
    #[instrument(name = "conversation.create", skip(self, title), err)]
    pub async fn create(
        &self,
        title: &str,
        participant_ids: Vec<Uuid>,
    ) -> SummaryResult<ConversationSummary> {
        let summary = self
            .store
            .insert(NewConversation {
                title: normalize_title(title)?,
                participant_ids: dedup_participants(participant_ids),
                created_at: self.clock.now(),
            })
            .await?;

        info!(conversation_id = %summary.id, sequence = summary.sequence, "conversation created");
        Ok(summary)
    }

    /// # Errors
    /// `NotFound` if there is no such conversation.
    pub async fn get(&self, conversation_id: Uuid) -> SummaryResult<ConversationSummary> {
        self.store
            .fetch(conversation_id)
            .await?
            .ok_or_else(|| SummaryError::conversation_not_found(conversation_id))
    }

    /// Renames a conversation. Recency and listing position are untouched.
    ///
    /// # Errors
    /// `Validation` for a bad title, `NotFound` if the conversation is
    /// absent, `Conflict` once retries are exhausted.
    #[instrument(name = "conversation.rename", skip(self, title), err)]
    pub async fn rename(
        &self,
        conversation_id: Uuid,
        title: &str,
    ) -> SummaryResult<ConversationSummary> {
        let title = normalize_title(title)?;
        self.synchronizer
            .write(conversation_id, "rename", |current| {
                (current.title != title).then(|| SummaryPatch::rename(title.as_str()))
            })
            .await
    }
}
