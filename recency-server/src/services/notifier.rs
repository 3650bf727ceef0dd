//! Fan-out of committed summaries to subscribed sessions.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use metrics::counter;
use recency_shared::{
    config::server::StreamConfig,
    models::{ConversationSummary, StreamErrorEvent, SummaryStreamEvent},
};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};
use uuid::Uuid;

/// Outbound side of the synchronizer. Delivery is best effort and never
/// affects the committed summary.
#[async_trait]
pub trait ChangeNotifier: Send + Sync + std::fmt::Debug {
    /// Announces a committed summary to everyone watching the conversation.
    async fn notify(&self, conversation_id: Uuid, summary: &ConversationSummary);
}

/// Notifier shared between the synchronizer and the conversation service.
pub type SharedNotifier = Arc<dyn ChangeNotifier>;

/// An event as delivered to a session. Error events carry no id so they are
/// never replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubEvent {
    /// SSE event id, `None` for errors.
    pub id: Option<String>,
    /// Payload sent to the client.
    pub event: SummaryStreamEvent,
}

impl HubEvent {
    pub(crate) fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            id: None,
            event: SummaryStreamEvent::Error {
                payload: StreamErrorEvent {
                    code: code.to_string(),
                    message: message.into(),
                },
            },
        }
    }
}

struct ConversationChannel {
    sender: broadcast::Sender<HubEvent>,
    history: VecDeque<HubEvent>,
    next_sequence: u64,
    last_revision: Option<i64>,
    last_active: Instant,
}

impl ConversationChannel {
    fn new(capacity: usize, now: Instant) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            history: VecDeque::new(),
            next_sequence: 0,
            last_revision: None,
            last_active: now,
        }
    }

    fn backlog_after(&self, last_id: &str) -> Option<Vec<HubEvent>> {
        self.history
            .iter()
            .position(|event| event.id.as_deref() == Some(last_id))
            .map(|idx| self.history.iter().skip(idx + 1).cloned().collect())
    }

    fn latest(&self) -> Vec<HubEvent> {
        self.history.back().cloned().into_iter().collect()
    }

    /// Records the revision carried by `event`. Returns `false` when a summary
    /// at the same or a newer revision was already published.
    fn accept(&mut self, event: &SummaryStreamEvent) -> bool {
        let SummaryStreamEvent::SummaryUpdated { payload } = event else {
            return true;
        };
        if self
            .last_revision
            .is_some_and(|published| payload.revision <= published)
        {
            return false;
        }
        self.last_revision = Some(payload.revision);
        true
    }

    fn is_idle(&self, now: Instant, retention: Duration) -> bool {
        self.sender.receiver_count() == 0 && now.duration_since(self.last_active) >= retention
    }
}

struct HubState {
    channels: HashMap<Uuid, ConversationChannel>,
    last_sweep: Instant,
}

/// What a new session receives: events to replay first, then the live feed.
#[derive(Debug)]
pub struct Subscription {
    /// Events to send before anything from `receiver`.
    pub backlog: Vec<HubEvent>,
    /// Live events published after the backlog snapshot.
    pub receiver: broadcast::Receiver<HubEvent>,
}

/// Per-conversation broadcast hub with a bounded, resumable history.
///
/// Channels nobody listens to are dropped once they have been quiet for the
/// configured retention.
pub struct SummaryHub {
    capacity: usize,
    history_limit: usize,
    id_prefix: String,
    idle_retention: Duration,
    state: Mutex<HubState>,
}

impl std::fmt::Debug for SummaryHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryHub")
            .field("capacity", &self.capacity)
            .field("history_limit", &self.history_limit)
            .field("id_prefix", &self.id_prefix)
            .field("idle_retention", &self.idle_retention)
            .finish_non_exhaustive()
    }
}

impl SummaryHub {
    /// Builds an empty hub from the stream settings.
    #[must_use]
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            capacity: config.channel_capacity.max(1),
            history_limit: config.history_limit.max(1),
            id_prefix: config.id_prefix.clone(),
            idle_retention: Duration::from_secs(config.idle_retention_seconds),
            state: Mutex::new(HubState {
                channels: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Registers a session on `conversation_id`.
    ///
    /// Without a cursor the backlog is the most recent summary, which is
    /// everything a fresh client needs. With a cursor still in history the
    /// backlog is every event after it. A cursor that has aged out yields a
    /// `stale_cursor` error followed by the most recent summary.
    pub async fn subscribe(
        &self,
        conversation_id: Uuid,
        last_event_id: Option<&str>,
    ) -> Subscription {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        self.sweep(&mut state, now);
        let channel = state
            .channels
            .entry(conversation_id)
            .or_insert_with(|| ConversationChannel::new(self.capacity, now));

        // Subscribing under the lock means nothing published after the
        // backlog snapshot can be missed or delivered twice.
        let receiver = channel.sender.subscribe();
        let backlog = match last_event_id.filter(|id| !id.is_empty()) {
            None => channel.latest(),
            Some(last_id) => channel.backlog_after(last_id).unwrap_or_else(|| {
                info!(%conversation_id, last_id, "stream cursor no longer in history");
                let mut events = vec![HubEvent::error(
                    "stale_cursor",
                    "Event history no longer available; resuming from the latest summary.",
                )];
                events.extend(channel.latest());
                events
            }),
        };

        Subscription { backlog, receiver }
    }

    /// Assigns the next event id, records the event and broadcasts it.
    ///
    /// A summary whose revision is not newer than the last one published for
    /// the conversation is dropped and `None` is returned, so a notification
    /// that lost a race with a later commit never becomes the latest event.
    pub async fn publish(
        &self,
        conversation_id: Uuid,
        event: SummaryStreamEvent,
    ) -> Option<HubEvent> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let channel = state
            .channels
            .entry(conversation_id)
            .or_insert_with(|| ConversationChannel::new(self.capacity, now));

        if !channel.accept(&event) {
            debug!(%conversation_id, "dropping summary older than the last published revision");
            counter!("recency_notifications_superseded_total").increment(1);
            return None;
        }

        let message = HubEvent {
            id: Some(format!("{}{}", self.id_prefix, channel.next_sequence)),
            event,
        };
        channel.next_sequence += 1;
        channel.last_active = now;

        channel.history.push_back(message.clone());
        while channel.history.len() > self.history_limit {
            channel.history.pop_front();
        }

        // No receivers is not an error: the event stays in history.
        let delivered = channel.sender.send(message.clone()).unwrap_or(0);
        debug!(%conversation_id, delivered, "published summary event");

        self.sweep(&mut state, now);
        Some(message)
    }

    /// Number of live receivers on `conversation_id`.
    pub async fn subscriber_count(&self, conversation_id: Uuid) -> usize {
        self.state
            .lock()
            .await
            .channels
            .get(&conversation_id)
            .map_or(0, |channel| channel.sender.receiver_count())
    }

    /// Number of conversations the hub currently holds a channel for.
    pub async fn channel_count(&self) -> usize {
        self.state.lock().await.channels.len()
    }

    /// Drops idle channels, at most once per quarter of the retention.
    fn sweep(&self, state: &mut HubState, now: Instant) {
        if now.duration_since(state.last_sweep) < self.idle_retention / 4 {
            return;
        }
        state.last_sweep = now;

        let before = state.channels.len();
        let retention = self.idle_retention;
        state
            .channels
            .retain(|_, channel| !channel.is_idle(now, retention));

        let evicted = before - state.channels.len();
        if evicted > 0 {
            debug!(evicted, remaining = state.channels.len(), "evicted idle summary channels");
            counter!("recency_stream_channels_evicted_total")
                .increment(u64::try_from(evicted).unwrap_or(u64::MAX));
        }
    }
}

#[async_trait]
impl ChangeNotifier for SummaryHub {
    async fn notify(&self, conversation_id: Uuid, summary: &ConversationSummary) {
        let published = self
            .publish(
                conversation_id,
                SummaryStreamEvent::SummaryUpdated {
                    payload: summary.clone(),
                },
            )
            .await;
        if published.is_some() {
            counter!("recency_notifications_total").increment(1);
        }
    }
}
