use std::collections::BTreeMap;

use sqlx::Row;

use frontdesk_core::domain::conversation::{Channel, Conversation, ConversationId, ConversationState};
use frontdesk_core::domain::message::{Message, MessageId, SenderRole};

use super::{parse_timestamp, ConversationRepository, MessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let org_id: String =
        row.try_get("org_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let channel_str: String =
        row.try_get("channel").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let external_id: String =
        row.try_get("external_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let state_str: String =
        row.try_get("state").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let locked_by: Option<String> =
        row.try_get("locked_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let last_activity_at_str: String =
        row.try_get("last_activity_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let metadata_str: String =
        row.try_get("metadata").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let channel = Channel::parse(&channel_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown channel: {channel_str}")))?;
    let state = ConversationState::parse(&state_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown state: {state_str}")))?;
    let metadata: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&metadata_str).unwrap_or_default();

    Ok(Conversation {
        id: ConversationId(id),
        org_id,
        channel,
        external_id,
        state,
        locked_by,
        last_activity_at: parse_timestamp(&last_activity_at_str)?,
        metadata,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, org_id, channel, external_id, state, locked_by,
                    last_activity_at, metadata, created_at
             FROM conversation WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_conversation(r)?)),
            None => Ok(None),
        }
    }

    async fn find_open(
        &self,
        org_id: &str,
        channel: Channel,
        external_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, org_id, channel, external_id, state, locked_by,
                    last_activity_at, metadata, created_at
             FROM conversation
             WHERE org_id = ? AND channel = ? AND external_id = ? AND state != 'archived'",
        )
        .bind(org_id)
        .bind(channel.as_str())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_conversation(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let metadata_str = serde_json::to_string(&conversation.metadata)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO conversation (id, org_id, channel, external_id, state, locked_by,
                                       last_activity_at, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 state = excluded.state,
                 locked_by = excluded.locked_by,
                 last_activity_at = excluded.last_activity_at,
                 metadata = excluded.metadata",
        )
        .bind(&conversation.id.0)
        .bind(&conversation.org_id)
        .bind(conversation.channel.as_str())
        .bind(&conversation.external_id)
        .bind(conversation.state.as_str())
        .bind(&conversation.locked_by)
        .bind(conversation.last_activity_at.to_rfc3339())
        .bind(&metadata_str)
        .bind(conversation.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversation_id: String =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role_str: String =
        row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let content: String =
        row.try_get("content").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let channel_message_id: Option<String> =
        row.try_get("channel_message_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let confidence: Option<f64> =
        row.try_get("confidence").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let intent: Option<String> =
        row.try_get("intent").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let read: i64 = row.try_get("read").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let role = SenderRole::parse(&role_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown sender role: {role_str}")))?;

    Ok(Message {
        id: MessageId(id),
        conversation_id: ConversationId(conversation_id),
        role,
        content,
        channel_message_id,
        confidence: confidence.map(|c| c as f32),
        intent,
        read: read != 0,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn find_by_channel_message_id(
        &self,
        channel: Channel,
        channel_message_id: &str,
    ) -> Result<Option<Message>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, conversation_id, channel, role, content, channel_message_id,
                    confidence, intent, read, created_at
             FROM message WHERE channel = ? AND channel_message_id = ?",
        )
        .bind(channel.as_str())
        .bind(channel_message_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_message(r)?)),
            None => Ok(None),
        }
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, conversation_id, channel, role, content, channel_message_id,
                    confidence, intent, read, created_at
             FROM message
             WHERE conversation_id = ?
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(&conversation_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut messages =
            rows.iter().map(row_to_message).collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn save(&self, channel: Channel, message: Message) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO message (id, conversation_id, channel, role, content,
                                  channel_message_id, confidence, intent, read, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 read = excluded.read",
        )
        .bind(&message.id.0)
        .bind(&message.conversation_id.0)
        .bind(channel.as_str())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.channel_message_id)
        .bind(message.confidence.map(f64::from))
        .bind(&message.intent)
        .bind(message.read)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use frontdesk_core::domain::conversation::{Channel, Conversation, ConversationState};
    use frontdesk_core::domain::message::{Message, SenderRole};

    use super::{SqlConversationRepository, SqlMessageRepository};
    use crate::repositories::{ConversationRepository, MessageRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn save_and_find_open_by_channel_identity() {
        let pool = setup().await;
        let repo = SqlConversationRepository::new(pool);

        let conversation = Conversation::open("org-1", Channel::Whatsapp, "4479000001", Utc::now());
        repo.save(conversation.clone()).await.expect("save");

        let found = repo
            .find_open("org-1", Channel::Whatsapp, "4479000001")
            .await
            .expect("find")
            .expect("should exist");
        assert_eq!(found.id, conversation.id);
        assert_eq!(found.state, ConversationState::New);

        let other_channel =
            repo.find_open("org-1", Channel::Instagram, "4479000001").await.expect("find");
        assert!(other_channel.is_none());
    }

    #[tokio::test]
    async fn archived_conversations_do_not_match_open_lookup() {
        let pool = setup().await;
        let repo = SqlConversationRepository::new(pool);

        let mut conversation =
            Conversation::open("org-1", Channel::Website, "visitor-9", Utc::now());
        conversation.state = ConversationState::Archived;
        repo.save(conversation.clone()).await.expect("save");

        let open = repo.find_open("org-1", Channel::Website, "visitor-9").await.expect("find");
        assert!(open.is_none());

        let by_id = repo.find_by_id(&conversation.id).await.expect("find by id");
        assert!(by_id.is_some());
    }

    #[tokio::test]
    async fn save_upserts_state_and_lock() {
        let pool = setup().await;
        let repo = SqlConversationRepository::new(pool);

        let mut conversation =
            Conversation::open("org-1", Channel::Whatsapp, "4479000001", Utc::now());
        repo.save(conversation.clone()).await.expect("save");

        conversation.lock("agent:maria");
        repo.save(conversation.clone()).await.expect("upsert");

        let found =
            repo.find_by_id(&conversation.id).await.expect("find").expect("should exist");
        assert_eq!(found.state, ConversationState::HumanHandoff);
        assert_eq!(found.locked_by.as_deref(), Some("agent:maria"));
    }

    #[tokio::test]
    async fn message_dedup_lookup_is_scoped_per_channel() {
        let pool = setup().await;
        let conversations = SqlConversationRepository::new(pool.clone());
        let messages = SqlMessageRepository::new(pool);

        let conversation = Conversation::open("org-1", Channel::Whatsapp, "4479000001", Utc::now());
        conversations.save(conversation.clone()).await.expect("save conversation");

        let inbound = Message::inbound(
            conversation.id.clone(),
            "are you open?",
            Some("wamid.777".to_owned()),
            Utc::now(),
        );
        messages.save(Channel::Whatsapp, inbound.clone()).await.expect("save message");

        let hit = messages
            .find_by_channel_message_id(Channel::Whatsapp, "wamid.777")
            .await
            .expect("lookup");
        assert_eq!(hit.map(|m| m.id), Some(inbound.id));

        let miss = messages
            .find_by_channel_message_id(Channel::Instagram, "wamid.777")
            .await
            .expect("lookup other channel");
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn duplicate_channel_message_id_is_rejected_by_schema() {
        let pool = setup().await;
        let conversations = SqlConversationRepository::new(pool.clone());
        let messages = SqlMessageRepository::new(pool);

        let conversation = Conversation::open("org-1", Channel::Whatsapp, "4479000001", Utc::now());
        conversations.save(conversation.clone()).await.expect("save conversation");

        let first = Message::inbound(
            conversation.id.clone(),
            "are you open?",
            Some("wamid.1".to_owned()),
            Utc::now(),
        );
        messages.save(Channel::Whatsapp, first).await.expect("save first");

        let replay = Message::inbound(
            conversation.id.clone(),
            "are you open?",
            Some("wamid.1".to_owned()),
            Utc::now(),
        );
        let result = messages.save(Channel::Whatsapp, replay).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_for_conversation_returns_oldest_first_within_limit() {
        let pool = setup().await;
        let conversations = SqlConversationRepository::new(pool.clone());
        let messages = SqlMessageRepository::new(pool);

        let conversation = Conversation::open("org-1", Channel::Website, "visitor-1", Utc::now());
        conversations.save(conversation.clone()).await.expect("save conversation");

        let base = Utc::now();
        for (offset, text) in ["hello", "are you open?", "thanks"].iter().enumerate() {
            let message = Message::inbound(
                conversation.id.clone(),
                *text,
                None,
                base + chrono::Duration::seconds(offset as i64),
            );
            messages.save(Channel::Website, message).await.expect("save message");
        }

        let recent =
            messages.list_for_conversation(&conversation.id, 2).await.expect("list");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "are you open?");
        assert_eq!(recent[1].content, "thanks");
    }
}
