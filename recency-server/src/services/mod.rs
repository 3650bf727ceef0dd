//! Summary synchronization, storage, ordering and notification.

pub mod conversation_service;
pub mod guard;
pub mod memory_store;
pub mod notifier;
pub mod ordering;
pub mod pg_store;
pub mod summary_store;
pub mod synchronizer;

pub use conversation_service::ConversationService;
pub use guard::{InvariantGuard, PreviewPatch, SealedWrite, SummaryPatch};
pub use memory_store::MemorySummaryStore;
pub use notifier::{ChangeNotifier, HubEvent, SharedNotifier, Subscription, SummaryHub};
pub use ordering::{ConversationLister, listing_order, sort_for_listing};
pub use pg_store::PgSummaryStore;
pub use summary_store::{
    NewConversation, SharedSummaryStore, SummaryError, SummaryResult, SummaryStore,
};
pub use synchronizer::{RetryPolicy, SummarySynchronizer, plan_message_update, plan_recompute};
