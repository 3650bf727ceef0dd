//! Pre-persist hook for conversation summaries.
//!
//! Every write goes through [`InvariantGuard::seal`]: it is the only way to
//! build a [`SealedWrite`], and stores only accept sealed writes. The guard
//! decides where `updated_at` comes from:
//!
//! * message-triggered writes carry a stamp; `last_message_at` and
//!   `updated_at` are both set to that one instant, never re-sampled;
//! * every other write (rename, recompute) has no message instant, so the
//!   guard stamps `updated_at` from the clock and leaves `last_message_at`
//!   alone.

use metrics::counter;
use recency_shared::models::{ConversationSummary, LastMessage, Timestamp};
use tracing::warn;

use crate::clock::SharedClock;

/// What happens to the latest-message preview.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PreviewPatch {
    /// Leave the stored preview as is.
    #[default]
    Keep,
    /// Point the preview at another message.
    Replace(LastMessage),
    /// No message is left to preview.
    Clear,
}

/// A requested change to a summary, before the guard resolves timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SummaryPatch {
    /// Instant derived from a message. `Some` marks the write as
    /// message-triggered.
    pub stamp: Option<Timestamp>,
    /// Change to the latest-message preview.
    pub preview: PreviewPatch,
    /// New title, if renaming.
    pub title: Option<String>,
}

impl SummaryPatch {
    /// A message-triggered patch stamped with the message's instant.
    #[must_use]
    pub fn message(at: Timestamp, preview: PreviewPatch) -> Self {
        Self {
            stamp: Some(at),
            preview,
            title: None,
        }
    }

    /// A title change.
    #[must_use]
    pub fn rename(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Adds a title change to this patch.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Fully resolved summary fields, ready for an atomic compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedWrite {
    expected_revision: i64,
    title: String,
    last_message: Option<LastMessage>,
    last_message_at: Option<Timestamp>,
    updated_at: Timestamp,
}

impl SealedWrite {
    /// Revision the stored document must still have for the write to apply.
    #[must_use]
    pub const fn expected_revision(&self) -> i64 {
        self.expected_revision
    }

    /// Title to store.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Preview to store.
    #[must_use]
    pub const fn last_message(&self) -> Option<&LastMessage> {
        self.last_message.as_ref()
    }

    /// Recency to store; never earlier than the stored one.
    #[must_use]
    pub const fn last_message_at(&self) -> Option<Timestamp> {
        self.last_message_at
    }

    /// Modification instant to store.
    #[must_use]
    pub const fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// True when committing would not change any stored field.
    #[must_use]
    pub fn is_noop_for(&self, current: &ConversationSummary) -> bool {
        current.revision == self.expected_revision
            && current.title == self.title
            && current.last_message == self.last_message
            && current.last_message_at == self.last_message_at
            && current.updated_at == self.updated_at
    }

    /// Writes the sealed fields into `summary` and bumps its revision.
    pub(crate) fn apply_to(self, summary: &mut ConversationSummary) {
        summary.title = self.title;
        summary.last_message = self.last_message;
        summary.last_message_at = self.last_message_at;
        summary.updated_at = self.updated_at;
        summary.revision += 1;
    }
}

/// Resolves patches into sealed writes.
#[derive(Debug, Clone)]
pub struct InvariantGuard {
    clock: SharedClock,
}

impl InvariantGuard {
    /// A guard that stamps clock-driven writes from `clock`.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    /// The guard clock's current instant.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Resolves `patch` against the current document.
    #[must_use]
    pub fn seal(&self, current: &ConversationSummary, patch: SummaryPatch) -> SealedWrite {
        let (last_message_at, updated_at) = match patch.stamp {
            Some(stamp) => {
                let resolved = current
                    .last_message_at
                    .map_or(stamp, |stored| stored.max(stamp));
                if resolved != stamp {
                    counter!("recency_summary_clamped_total").increment(1);
                    warn!(
                        conversation_id = %current.id,
                        stamp = %stamp,
                        stored = %resolved,
                        "message stamp older than stored recency; keeping stored value"
                    );
                }
                (Some(resolved), resolved)
            }
            None => (current.last_message_at, self.clock.now()),
        };

        let last_message = match patch.preview {
            PreviewPatch::Keep => current.last_message.clone(),
            PreviewPatch::Replace(preview) => Some(preview),
            PreviewPatch::Clear => None,
        };

        SealedWrite {
            expected_revision: current.revision,
            title: patch.title.unwrap_or_else(|| current.title.clone()),
            last_message,
            last_message_at,
            updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use recency_shared::models::MessageKind;
    use std::sync::Arc;
    use uuid::Uuid;

    fn t0() -> Timestamp {
        Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap())
    }

    fn guard_at(now: Timestamp) -> InvariantGuard {
        InvariantGuard::new(Arc::new(ManualClock::new(now)))
    }

    fn summary(last_message_at: Option<Timestamp>) -> ConversationSummary {
        ConversationSummary {
            id: Uuid::from_u128(1),
            title: "General".into(),
            participant_ids: vec![],
            last_message: None,
            last_message_at,
            updated_at: t0().plus_millis(-1_000),
            created_at: t0().plus_millis(-1_000),
            sequence: 1,
            revision: 3,
        }
    }

    fn preview(at: Timestamp) -> LastMessage {
        LastMessage {
            message_id: Uuid::from_u128(9),
            text: "hi".into(),
            sender_id: Uuid::from_u128(2),
            kind: MessageKind::Text,
            created_at: at,
        }
    }

    #[test]
    fn message_stamp_sets_both_fields_from_one_instant() {
        let guard = guard_at(t0().plus_millis(90_000));
        let write = guard.seal(
            &summary(None),
            SummaryPatch::message(t0(), PreviewPatch::Replace(preview(t0()))),
        );

        assert_eq!(write.last_message_at(), Some(t0()));
        assert_eq!(write.updated_at(), t0());
        assert_eq!(write.expected_revision(), 3);
    }

    #[test]
    fn non_message_write_stamps_updated_at_from_clock() {
        let now = t0().plus_millis(5_000);
        let guard = guard_at(now);
        let current = summary(Some(t0()));

        let write = guard.seal(&current, SummaryPatch::rename("Renamed"));

        assert_eq!(write.title(), "Renamed");
        assert_eq!(write.updated_at(), now);
        assert_eq!(write.last_message_at(), Some(t0()));
    }

    #[test]
    fn message_stamp_wins_when_patch_also_renames() {
        let guard = guard_at(t0().plus_millis(60_000));
        let at = t0().plus_millis(50);
        let patch = SummaryPatch::message(at, PreviewPatch::Keep).with_title("Both");

        let write = guard.seal(&summary(Some(t0())), patch);

        assert_eq!(write.title(), "Both");
        assert_eq!(write.last_message_at(), Some(at));
        assert_eq!(write.updated_at(), at);
    }

    #[test]
    fn older_stamp_is_clamped_to_stored_value() {
        let guard = guard_at(t0());
        let stored = t0().plus_millis(50);
        let write = guard.seal(
            &summary(Some(stored)),
            SummaryPatch::message(t0().plus_millis(-20), PreviewPatch::Keep),
        );

        assert_eq!(write.last_message_at(), Some(stored));
        assert_eq!(write.updated_at(), stored);
    }

    #[test]
    fn clear_removes_preview_and_keeps_recency() {
        let guard = guard_at(t0().plus_millis(10));
        let mut current = summary(Some(t0()));
        current.last_message = Some(preview(t0()));

        let write = guard.seal(
            &current,
            SummaryPatch {
                preview: PreviewPatch::Clear,
                ..SummaryPatch::default()
            },
        );

        assert!(write.last_message().is_none());
        assert_eq!(write.last_message_at(), Some(t0()));
    }

    #[test]
    fn noop_detection_and_apply() {
        let guard = guard_at(t0());
        let mut current = summary(Some(t0()));
        current.updated_at = t0();

        let replay = guard.seal(&current, SummaryPatch::message(t0(), PreviewPatch::Keep));
        assert!(replay.is_noop_for(&current));

        let newer = guard.seal(
            &current,
            SummaryPatch::message(t0().plus_millis(1), PreviewPatch::Keep),
        );
        assert!(!newer.is_noop_for(&current));

        newer.apply_to(&mut current);
        assert_eq!(current.revision, 4);
        assert_eq!(current.last_message_at, Some(t0().plus_millis(1)));
        assert_eq!(current.updated_at, t0().plus_millis(1));
    }
}
