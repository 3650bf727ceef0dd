//! In-process summary store.
//!
//! Each document sits behind its own mutex, so a commit only serializes
//! writers of the same conversation. The map lock is held just long enough
//! to find the document.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use async_trait::async_trait;
use recency_shared::models::ConversationSummary;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{
    guard::SealedWrite,
    summary_store::{NewConversation, SummaryError, SummaryResult, SummaryStore},
};

type Document = Arc<Mutex<ConversationSummary>>;

/// Summary store kept in process memory.
#[derive(Debug, Default)]
pub struct MemorySummaryStore {
    documents: RwLock<HashMap<Uuid, Document>>,
    next_sequence: AtomicI64,
}

impl MemorySummaryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn document(&self, conversation_id: Uuid) -> Option<Document> {
        self.documents.read().await.get(&conversation_id).cloned()
    }

    #[cfg(test)]
    pub(crate) async fn put(&self, summary: ConversationSummary) {
        self.next_sequence.fetch_max(summary.sequence, Ordering::SeqCst);
        self.documents
            .write()
            .await
            .insert(summary.id, Arc::new(Mutex::new(summary)));
    }
}

#[async_trait]
impl SummaryStore for MemorySummaryStore {
    async fn insert(&self, conversation: NewConversation) -> SummaryResult<ConversationSummary> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let summary = ConversationSummary {
            id: Uuid::new_v4(),
            title: conversation.title,
            participant_ids: conversation.participant_ids,
            last_message: None,
            last_message_at: None,
            updated_at: conversation.created_at,
            created_at: conversation.created_at,
            sequence,
            revision: 0,
        };

        self.documents
            .write()
            .await
            .insert(summary.id, Arc::new(Mutex::new(summary.clone())));
        Ok(summary)
    }

    async fn fetch(&self, conversation_id: Uuid) -> SummaryResult<Option<ConversationSummary>> {
        match self.document(conversation_id).await {
            Some(document) => Ok(Some(document.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn commit(
        &self,
        conversation_id: Uuid,
        write: SealedWrite,
    ) -> SummaryResult<ConversationSummary> {
        let document = self
            .document(conversation_id)
            .await
            .ok_or_else(|| SummaryError::conversation_not_found(conversation_id))?;

        let mut stored = document.lock().await;
        if stored.revision != write.expected_revision() {
            return Err(SummaryError::revision_conflict(
                conversation_id,
                write.expected_revision(),
            ));
        }

        write.apply_to(&mut stored);
        Ok(stored.clone())
    }

    async fn list_for_participant(&self, user_id: Uuid) -> SummaryResult<Vec<ConversationSummary>> {
        let documents: Vec<Document> = self.documents.read().await.values().cloned().collect();

        let mut summaries = Vec::new();
        for document in documents {
            let summary = document.lock().await;
            if summary.has_participant(user_id) {
                summaries.push(summary.clone());
            }
        }
        Ok(summaries)
    }
}
