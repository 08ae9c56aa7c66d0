use crate::{
    error::Result,
    conversation::{
        conversation_dto::{ConversationListRow, ConversationWithLastMessage},
        conversation_models::{Conversation, Message, Participant, ParticipantRole},
    },
};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct ConversationRepository {
    pool: PgPool,
}

const MESSAGE_WINDOW_SQL: &str = "SELECT * FROM (
    SELECT * FROM messages
    WHERE conversation_id = $1
    ORDER BY seq DESC
    LIMIT $2 OFFSET $3
 ) window_rows
 ORDER BY seq ASC";

impl ConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    pub async fn user_exists(&self, user_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    /// Returns the conversation for the pair and whether this call created it.
    pub async fn get_or_create(&self, user_id: Uuid, company_id: Uuid) -> Result<(Conversation, bool)> {
        let inserted = sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations (user_id, company_id)
             VALUES ($1, $2)
             ON CONFLICT (user_id, company_id) DO NOTHING
             RETURNING *",
        )
        .bind(user_id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(conversation) = inserted {
            return Ok((conversation, true));
        }

        let existing = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE user_id = $1 AND company_id = $2",
        )
        .bind(user_id)
        .bind(company_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((existing, false))
    }

    /// Contact list for one participant with only the newest message of each
    /// conversation. Conversations without messages sort last.
    pub async fn find_with_last_message(
        &self,
        participant: &Participant,
    ) -> Result<Vec<ConversationWithLastMessage>> {
        let (own_column, counterpart_join) = match participant.role {
            ParticipantRole::User => (
                "c.user_id",
                "JOIN companies cp ON cp.id = c.company_id",
            ),
            ParticipantRole::Company => (
                "c.company_id",
                "JOIN users cp ON cp.id = c.user_id",
            ),
        };
        let (image_column, secondary_column) = match participant.role {
            ParticipantRole::User => ("cp.logo_url", "cp.website"),
            ParticipantRole::Company => ("cp.photo_url", "cp.email"),
        };

        let query = format!(
            "SELECT
                c.id AS conversation_id,
                cp.id AS counterpart_id,
                cp.name AS name,
                {image_column} AS image_url,
                {secondary_column} AS secondary,
                lm.content AS last_content,
                lm.created_at AS last_date,
                (
                    SELECT COUNT(*) FROM messages um
                    WHERE um.conversation_id = c.id
                      AND um.sender <> $2
                      AND um.is_read = false
                ) AS unread_count
             FROM conversations c
             {counterpart_join}
             LEFT JOIN LATERAL (
                SELECT m.content, m.created_at
                FROM messages m
                WHERE m.conversation_id = c.id
                ORDER BY m.seq DESC
                LIMIT 1
             ) lm ON TRUE
             WHERE {own_column} = $1
             ORDER BY lm.created_at DESC NULLS LAST, c.created_at DESC"
        );

        let rows = sqlx::query_as::<_, ConversationListRow>(&query)
            .bind(participant.id)
            .bind(participant.role)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_dto(participant.role))
            .collect())
    }

    /// Newest-first window of `limit` messages starting `offset` messages back,
    /// returned in insertion order.
    pub async fn find_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(MESSAGE_WINDOW_SQL)
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    pub async fn count_messages(&self, conversation_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn create_message(
        &self,
        conversation_id: Uuid,
        sender: ParticipantRole,
        content: &str,
    ) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (conversation_id, sender, content)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(conversation_id)
        .bind(sender)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    /// Marks every unread message written by the other side as read.
    pub async fn mark_conversation_as_read(
        &self,
        conversation_id: Uuid,
        reader: ParticipantRole,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE messages
             SET is_read = true
             WHERE conversation_id = $1 AND sender <> $2 AND is_read = false",
        )
        .bind(conversation_id)
        .bind(reader)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
