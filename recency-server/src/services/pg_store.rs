//! Postgres summary store.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recency_shared::models::{ConversationSummary, LastMessage, MessageKind, Timestamp};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::db::bootstrap;

use super::{
    guard::SealedWrite,
    summary_store::{NewConversation, SummaryError, SummaryResult, SummaryStore},
};

macro_rules! summary_columns {
    () => {
        "s.id, s.title,
         ARRAY(SELECT p.user_id FROM recency.conversation_participants p
               WHERE p.conversation_id = s.id ORDER BY p.position) AS participant_ids,
         s.last_message_id, s.last_message_text, s.last_message_sender,
         s.last_message_kind, s.last_message_created_at,
         s.last_message_at, s.updated_at, s.created_at, s.sequence, s.revision"
    };
}

const FETCH_SQL: &str = concat!(
    "SELECT ",
    summary_columns!(),
    " FROM recency.conversation_summaries s WHERE s.id = $1"
);

const LIST_SQL: &str = concat!(
    "SELECT ",
    summary_columns!(),
    " FROM recency.conversation_summaries s
      WHERE EXISTS (SELECT 1 FROM recency.conversation_participants p
                    WHERE p.conversation_id = s.id AND p.user_id = $1)
      ORDER BY s.last_message_at DESC NULLS LAST, s.sequence DESC"
);

// One statement: the revision check and the write happen atomically, and the
// caller gets the post-update document back.
const COMMIT_SQL: &str = concat!(
    "WITH s AS (
        UPDATE recency.conversation_summaries
           SET title = $3,
               last_message_id = $4,
               last_message_text = $5,
               last_message_sender = $6,
               last_message_kind = $7,
               last_message_created_at = $8,
               last_message_at = $9,
               updated_at = $10,
               revision = revision + 1
         WHERE id = $1 AND revision = $2
     RETURNING *
     )
     SELECT ",
    summary_columns!(),
    " FROM s"
);

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: Uuid,
    title: String,
    participant_ids: Vec<Uuid>,
    last_message_id: Option<Uuid>,
    last_message_text: Option<String>,
    last_message_sender: Option<Uuid>,
    last_message_kind: Option<String>,
    last_message_created_at: Option<DateTime<Utc>>,
    last_message_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    sequence: i64,
    revision: i64,
}

impl TryFrom<SummaryRow> for ConversationSummary {
    type Error = SummaryError;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        let last_message = match (
            row.last_message_id,
            row.last_message_sender,
            row.last_message_kind,
            row.last_message_created_at,
        ) {
            (Some(message_id), Some(sender_id), Some(kind), Some(created_at)) => {
                let kind = MessageKind::try_from(kind.as_str()).map_err(|err| {
                    SummaryError::Database(sqlx::Error::Decode(
                        format!("{err} '{kind}' on conversation {}", row.id).into(),
                    ))
                })?;
                Some(LastMessage {
                    message_id,
                    text: row.last_message_text.unwrap_or_default(),
                    sender_id,
                    kind,
                    created_at: Timestamp(created_at),
                })
            }
            _ => None,
        };

        Ok(Self {
            id: row.id,
            title: row.title,
            participant_ids: row.participant_ids,
            last_message,
            last_message_at: row.last_message_at.map(Timestamp),
            updated_at: Timestamp(row.updated_at),
            created_at: Timestamp(row.created_at),
            sequence: row.sequence,
            revision: row.revision,
        })
    }
}

/// Postgres-backed summary store.
///
/// `commit` is a single conditional `UPDATE … RETURNING`, so the database's
/// row-level atomicity linearizes writers of one conversation without any
/// application lock.
#[derive(Clone)]
pub struct PgSummaryStore {
    pool: PgPool,
}

impl fmt::Debug for PgSummaryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgSummaryStore").finish_non_exhaustive()
    }
}

impl PgSummaryStore {
    /// A store over an already bootstrapped pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SummaryStore for PgSummaryStore {
    #[instrument(name = "store.insert", skip(self, conversation), err)]
    async fn insert(&self, conversation: NewConversation) -> SummaryResult<ConversationSummary> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO recency.conversation_summaries (id, title, updated_at, created_at)
             VALUES ($1, $2, $3, $3)",
        )
        .bind(id)
        .bind(&conversation.title)
        .bind(conversation.created_at.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO recency.conversation_participants (conversation_id, user_id, position)
             SELECT $1, p.user_id, p.position
               FROM UNNEST($2::uuid[]) WITH ORDINALITY AS p(user_id, position)",
        )
        .bind(id)
        .bind(&conversation.participant_ids)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, SummaryRow>(FETCH_SQL)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        row.try_into()
    }

    #[instrument(name = "store.fetch", skip(self), err)]
    async fn fetch(&self, conversation_id: Uuid) -> SummaryResult<Option<ConversationSummary>> {
        sqlx::query_as::<_, SummaryRow>(FETCH_SQL)
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await?
            .map(ConversationSummary::try_from)
            .transpose()
    }

    #[instrument(name = "store.commit", skip(self, write), err)]
    async fn commit(
        &self,
        conversation_id: Uuid,
        write: SealedWrite,
    ) -> SummaryResult<ConversationSummary> {
        let preview = write.last_message();
        let row = sqlx::query_as::<_, SummaryRow>(COMMIT_SQL)
            .bind(conversation_id)
            .bind(write.expected_revision())
            .bind(write.title())
            .bind(preview.map(|message| message.message_id))
            .bind(preview.map(|message| message.text.as_str()))
            .bind(preview.map(|message| message.sender_id))
            .bind(preview.map(|message| message.kind.as_str()))
            .bind(preview.map(|message| message.created_at.0))
            .bind(write.last_message_at().map(|at| at.0))
            .bind(write.updated_at().0)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return row.try_into();
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM recency.conversation_summaries WHERE id = $1)",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;

        Err(if exists {
            SummaryError::revision_conflict(conversation_id, write.expected_revision())
        } else {
            SummaryError::conversation_not_found(conversation_id)
        })
    }

    #[instrument(name = "store.list_for_participant", skip(self), err)]
    async fn list_for_participant(&self, user_id: Uuid) -> SummaryResult<Vec<ConversationSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(LIST_SQL)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ConversationSummary::try_from).collect()
    }

    async fn ping(&self) -> SummaryResult<()> {
        bootstrap::ensure_readiness(&self.pool).await?;
        Ok(())
    }
}
