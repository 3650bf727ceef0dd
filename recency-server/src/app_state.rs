//! Shared application state.

use std::sync::Arc;

use recency_shared::config::server::Config;

use crate::{
    clock::{SharedClock, SystemClock},
    services::{
        ConversationLister, ConversationService, InvariantGuard, MemorySummaryStore, RetryPolicy,
        SharedSummaryStore, SummaryHub, SummarySynchronizer,
    },
};

/// Everything handlers need, wired once at startup.
#[derive(Clone, Debug)]
pub struct AppState {
    pub(crate) config: Arc<Config>,
    pub(crate) store: SharedSummaryStore,
    pub(crate) hub: Arc<SummaryHub>,
    pub(crate) synchronizer: SummarySynchronizer,
    pub(crate) conversations: ConversationService,
    pub(crate) lister: ConversationLister,
}

impl AppState {
    /// Wires the services around `store` and `clock`.
    #[must_use]
    pub fn new(config: Config, store: SharedSummaryStore, clock: SharedClock) -> Self {
        let hub = Arc::new(SummaryHub::new(&config.stream));
        let synchronizer = SummarySynchronizer::new(
            Arc::clone(&store),
            InvariantGuard::new(Arc::clone(&clock)),
            hub.clone(),
            RetryPolicy::from(&config.sync),
        );

        Self {
            conversations: ConversationService::new(
                Arc::clone(&store),
                synchronizer.clone(),
                clock,
            ),
            lister: ConversationLister::new(Arc::clone(&store)),
            config: Arc::new(config),
            store,
            hub,
            synchronizer,
        }
    }

    /// State backed by the in-process store and the system clock.
    #[must_use]
    pub fn in_memory(config: Config) -> Self {
        Self::new(
            config,
            Arc::new(MemorySummaryStore::new()),
            Arc::new(SystemClock),
        )
    }

    /// Resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}
