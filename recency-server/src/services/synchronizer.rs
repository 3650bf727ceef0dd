//! Derives conversation summaries from persisted messages.
//!
//! Every write is read, seal, compare-and-swap: the current document is read
//! whole, the guard resolves the patch into a [`SealedWrite`], and the store
//! applies it only if nobody committed in between. On contention the whole
//! cycle is retried with the identical input, which is safe because a
//! message update is a pure function of the stored document and the message.
//!
//! [`SealedWrite`]: super::guard::SealedWrite

use std::{future::Future, time::Duration, time::Instant};

use metrics::{counter, histogram};
use recency_shared::{
    config::server::SyncConfig,
    models::{ConversationSummary, LastMessage, PersistedMessage},
};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::{
    guard::{InvariantGuard, PreviewPatch, SummaryPatch},
    notifier::SharedNotifier,
    summary_store::{SharedSummaryStore, SummaryError, SummaryResult},
};

/// Upper bound on the wait before any single retry.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Bounded retry of store contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt conflicts.
    pub max_conflict_retries: u32,
    /// Delay before the first retry; the n-th retry waits n times as long,
    /// capped at [`MAX_RETRY_DELAY`].
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for RetryPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_conflict_retries: config.max_conflict_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry`.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff
            .checked_mul(retry)
            .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
    }

    /// Runs `attempt` until it succeeds, fails with a non-retryable error, or
    /// the retry budget is spent. Only [`SummaryError::Conflict`] is retried.
    ///
    /// # Errors
    /// The first non-retryable error, or the last conflict once the budget
    /// is spent.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        conversation_id: Uuid,
        mut attempt: F,
    ) -> SummaryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SummaryResult<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(err) if err.is_retryable() => {
                    counter!("recency_summary_conflicts_total").increment(1);
                    if retries >= self.max_conflict_retries {
                        warn!(%conversation_id, operation, retries, "retry budget exhausted");
                        return Err(err);
                    }
                    retries += 1;
                    debug!(
                        %conversation_id,
                        operation,
                        retries,
                        "summary write conflicted; retrying"
                    );
                    let delay = self.delay(retries);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                other => return other,
            }
        }
    }
}

/// Patch for a newly persisted message.
///
/// The preview moves to `message` only when it is later than the current
/// preview by `(created_at, id)`, so arrival order never decides content.
/// The stamp is always the message's own instant; the guard keeps it from
/// moving recency backwards.
#[must_use]
pub fn plan_message_update(
    current: &ConversationSummary,
    message: &PersistedMessage,
) -> SummaryPatch {
    let is_latest = current
        .last_message
        .as_ref()
        .is_none_or(|preview| message.recency_key() > preview.recency_key());

    let preview = if is_latest {
        PreviewPatch::Replace(LastMessage::from(message))
    } else {
        PreviewPatch::Keep
    };

    SummaryPatch::message(message.created_at, preview)
}

/// Patch for rebuilding the preview after the latest message was deleted or
/// edited. `None` when the summary already reflects `latest`.
///
/// A surviving message newer than the stored recency is treated like a new
/// message. Otherwise recency stays where it is and only the preview moves.
#[must_use]
pub fn plan_recompute(
    current: &ConversationSummary,
    latest: Option<&PersistedMessage>,
) -> Option<SummaryPatch> {
    let target = latest.map(LastMessage::from);
    if current.last_message == target {
        return None;
    }

    let patch = match (latest, target) {
        (Some(message), Some(preview))
            if current
                .last_message_at
                .is_none_or(|stored| message.created_at > stored) =>
        {
            SummaryPatch::message(message.created_at, PreviewPatch::Replace(preview))
        }
        (_, Some(preview)) => SummaryPatch {
            preview: PreviewPatch::Replace(preview),
            ..SummaryPatch::default()
        },
        (_, None) => SummaryPatch {
            preview: PreviewPatch::Clear,
            ..SummaryPatch::default()
        },
    };
    Some(patch)
}

fn ensure_belongs(conversation_id: Uuid, message: &PersistedMessage) -> SummaryResult<()> {
    if message.conversation_id == conversation_id {
        Ok(())
    } else {
        Err(SummaryError::Validation(format!(
            "message {} belongs to conversation {}, not {conversation_id}",
            message.id, message.conversation_id
        )))
    }
}

struct Applied {
    summary: ConversationSummary,
    changed: bool,
}

/// The only write path into the summary store.
#[derive(Debug, Clone)]
pub struct SummarySynchronizer {
    store: SharedSummaryStore,
    guard: InvariantGuard,
    notifier: SharedNotifier,
    retry: RetryPolicy,
}

impl SummarySynchronizer {
    /// Builds a synchronizer writing to `store` and announcing to `notifier`.
    #[must_use]
    pub fn new(
        store: SharedSummaryStore,
        guard: InvariantGuard,
        notifier: SharedNotifier,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            guard,
            notifier,
            retry,
        }
    }

    /// Applies `message` once, without retry or notification.
    ///
    /// # Errors
    /// `Validation` if the message belongs elsewhere, `NotFound` if the
    /// conversation is absent, `Conflict` if a concurrent write won.
    #[instrument(name = "summary.apply", skip(self, message), fields(message_id = %message.id), err)]
    pub async fn apply(
        &self,
        conversation_id: Uuid,
        message: &PersistedMessage,
    ) -> SummaryResult<ConversationSummary> {
        ensure_belongs(conversation_id, message)?;
        let message = &message.at_storage_precision();
        let plan = |current: &ConversationSummary| Some(plan_message_update(current, message));
        self.write_once(conversation_id, "message", &plan)
            .await
            .map(|applied| applied.summary)
    }

    /// Inbound event from the message store. Retries contention, then
    /// broadcasts the committed summary if anything changed.
    ///
    /// # Errors
    /// As [`Self::apply`]; `Conflict` only once the retry budget is spent.
    #[instrument(
        name = "summary.on_message_persisted",
        skip(self, message),
        fields(message_id = %message.id),
        err
    )]
    pub async fn on_message_persisted(
        &self,
        conversation_id: Uuid,
        message: &PersistedMessage,
    ) -> SummaryResult<ConversationSummary> {
        if let Err(err) = ensure_belongs(conversation_id, message) {
            error!(
                %conversation_id,
                message_id = %message.id,
                error = %err,
                "rejected message event"
            );
            return Err(err);
        }

        let message = &message.at_storage_precision();
        self.write(conversation_id, "message", |current| {
            Some(plan_message_update(current, message))
        })
        .await
    }

    /// Rebuilds the preview from `latest`, the latest message still present.
    ///
    /// # Errors
    /// `Validation` if `latest` belongs to another conversation, `NotFound`
    /// if the conversation is absent.
    #[instrument(name = "summary.recompute", skip(self, latest), err)]
    pub async fn recompute(
        &self,
        conversation_id: Uuid,
        latest: Option<&PersistedMessage>,
    ) -> SummaryResult<ConversationSummary> {
        if let Some(message) = latest {
            ensure_belongs(conversation_id, message)?;
        }

        let latest = latest.map(PersistedMessage::at_storage_precision);
        self.write(conversation_id, "recompute", |current| {
            plan_recompute(current, latest.as_ref())
        })
        .await
    }

    /// Read, seal and commit with retry, then notify on change. `plan`
    /// returns `None` when there is nothing to write.
    pub(crate) async fn write<F>(
        &self,
        conversation_id: Uuid,
        path: &'static str,
        plan: F,
    ) -> SummaryResult<ConversationSummary>
    where
        F: Fn(&ConversationSummary) -> Option<SummaryPatch> + Sync,
    {
        let applied = self
            .retry
            .run(path, conversation_id, || {
                self.write_once(conversation_id, path, &plan)
            })
            .await?;

        if applied.changed {
            self.notifier.notify(conversation_id, &applied.summary).await;
        }
        Ok(applied.summary)
    }

    async fn write_once<F>(
        &self,
        conversation_id: Uuid,
        path: &'static str,
        plan: &F,
    ) -> SummaryResult<Applied>
    where
        F: Fn(&ConversationSummary) -> Option<SummaryPatch> + Sync,
    {
        let started = Instant::now();
        let current = self
            .store
            .fetch(conversation_id)
            .await?
            .ok_or_else(|| SummaryError::conversation_not_found(conversation_id))?;

        let Some(patch) = plan(&current) else {
            return Ok(Self::unchanged(current, path));
        };

        let write = self.guard.seal(&current, patch);
        if write.is_noop_for(&current) {
            return Ok(Self::unchanged(current, path));
        }

        let summary = self.store.commit(conversation_id, write).await?;
        counter!("recency_summary_writes_total", "path" => path).increment(1);
        histogram!("recency_summary_apply_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
        debug!(
            %conversation_id,
            path,
            revision = summary.revision,
            "summary committed"
        );

        Ok(Applied {
            summary,
            changed: true,
        })
    }

    fn unchanged(summary: ConversationSummary, path: &'static str) -> Applied {
        counter!("recency_summary_noop_total", "path" => path).increment(1);
        debug!(conversation_id = %summary.id, path, "summary already up to date");
        Applied {
            summary,
            changed: false,
        }
    }
}
