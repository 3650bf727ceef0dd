//! Deterministic conversation listing.

use std::cmp::Ordering;

use recency_shared::models::ConversationSummary;
use tracing::instrument;
use uuid::Uuid;

use super::summary_store::{SharedSummaryStore, SummaryResult};

/// Listing order: `last_message_at` descending with conversations that have
/// no message after all others, then `sequence` descending.
///
/// `sequence` is unique, so this is a total order. `updated_at` is never
/// consulted.
#[must_use]
pub fn listing_order(a: &ConversationSummary, b: &ConversationSummary) -> Ordering {
    // `None < Some(_)`, so comparing in reverse puts absent values last.
    b.last_message_at
        .cmp(&a.last_message_at)
        .then_with(|| b.sequence.cmp(&a.sequence))
}

/// Sorts `summaries` in place by [`listing_order`].
pub fn sort_for_listing(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(listing_order);
}

/// Per-user listings read straight from the store.
#[derive(Debug, Clone)]
pub struct ConversationLister {
    store: SharedSummaryStore,
}

impl ConversationLister {
    /// A lister over `store`.
    #[must_use]
    pub fn new(store: SharedSummaryStore) -> Self {
        Self { store }
    }

    /// Conversations of `user_id`, most recent first. Each call re-reads the
    /// store.
    ///
    /// # Errors
    /// Only storage failures; concurrent writes never fail a listing.
    #[instrument(name = "summary.list", skip(self), err)]
    pub async fn list(&self, user_id: Uuid) -> SummaryResult<Vec<ConversationSummary>> {
        let mut summaries = self.store.list_for_participant(user_id).await?;
        sort_for_listing(&mut summaries);
        Ok(summaries)
    }
}
