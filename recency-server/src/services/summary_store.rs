//! Storage contract for conversation summaries.
//!
//! A store is a document store keyed by conversation id. The only write
//! primitive is [`SummaryStore::commit`], an atomic compare-and-swap on the
//! document revision that accepts nothing but a guard-sealed write.

use std::sync::Arc;

use async_trait::async_trait;
use recency_shared::models::{ConversationSummary, Timestamp};
use thiserror::Error;
use uuid::Uuid;

use super::guard::SealedWrite;

/// Failures of summary reads and writes.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// The conversation does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A concurrent write committed first.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The input was rejected before touching the store.
    #[error("validation error: {0}")]
    Validation(String),
    /// The backing database failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SummaryError {
    pub(crate) fn conversation_not_found(conversation_id: Uuid) -> Self {
        Self::NotFound(format!("conversation {conversation_id} not found"))
    }

    pub(crate) fn revision_conflict(conversation_id: Uuid, expected_revision: i64) -> Self {
        Self::Conflict(format!(
            "conversation {conversation_id} changed since revision {expected_revision}"
        ))
    }

    /// Only store contention is worth retrying; every other kind is final.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Result of summary operations.
pub type SummaryResult<T> = Result<T, SummaryError>;

/// A conversation about to be created. Message fields start empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversation {
    /// Trimmed, non-empty title.
    pub title: String,
    /// Initial participants.
    pub participant_ids: Vec<Uuid>,
    /// Creation instant; also the initial `updated_at`.
    pub created_at: Timestamp,
}

/// Persistence of conversation summaries.
#[async_trait]
pub trait SummaryStore: Send + Sync + std::fmt::Debug {
    /// Creates a summary with a fresh, strictly increasing `sequence`.
    ///
    /// # Errors
    /// [`SummaryError::Database`] if the store is unavailable.
    async fn insert(&self, conversation: NewConversation) -> SummaryResult<ConversationSummary>;

    /// The whole summary document, or `None` if the conversation is unknown.
    ///
    /// # Errors
    /// [`SummaryError::Database`] if the store is unavailable.
    async fn fetch(&self, conversation_id: Uuid) -> SummaryResult<Option<ConversationSummary>>;

    /// Applies `write` if and only if the stored revision still equals
    /// `write.expected_revision()`, returning the post-update document.
    ///
    /// # Errors
    /// [`SummaryError::NotFound`] if the document is absent and
    /// [`SummaryError::Conflict`] if another write got there first. A failed
    /// commit leaves the stored document untouched.
    async fn commit(
        &self,
        conversation_id: Uuid,
        write: SealedWrite,
    ) -> SummaryResult<ConversationSummary>;

    /// Every summary the user participates in, each read as a whole document.
    ///
    /// # Errors
    /// [`SummaryError::Database`] if the store is unavailable.
    async fn list_for_participant(&self, user_id: Uuid) -> SummaryResult<Vec<ConversationSummary>>;

    /// Readiness check.
    ///
    /// # Errors
    /// [`SummaryError::Database`] if the store cannot be reached.
    async fn ping(&self) -> SummaryResult<()> {
        Ok(())
    }
}

/// Store shared across services.
pub type SharedSummaryStore = Arc<dyn SummaryStore>;
