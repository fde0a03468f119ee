use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use frontdesk_core::domain::conversation::{Channel, Conversation, ConversationId};
use frontdesk_core::domain::manager::{phone_tail, ManagerId, ManagerNumber};
use frontdesk_core::domain::message::Message;
use frontdesk_core::domain::overrides::{OverrideId, OverrideKind, TemporaryOverride};
use frontdesk_core::domain::pending::{PendingActionId, PendingActionStatus, PendingManagerAction};
use frontdesk_core::domain::query::{ManagerQuery, ManagerQueryId, ManagerQueryStatus};

use super::{
    ConversationRepository, ManagerQueryRepository, ManagerRepository, MessageRepository,
    OverrideRepository, PendingActionRepository, RepositoryError,
};

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<String, Conversation>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(&id.0).cloned())
    }

    async fn find_open(
        &self,
        org_id: &str,
        channel: Channel,
        external_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .values()
            .find(|c| {
                c.org_id == org_id
                    && c.channel == channel
                    && c.external_id == external_id
                    && c.is_open()
            })
            .cloned())
    }

    async fn save(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.id.0.clone(), conversation);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<(Channel, Message)>>,
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn find_by_channel_message_id(
        &self,
        channel: Channel,
        channel_message_id: &str,
    ) -> Result<Option<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .find(|(c, m)| {
                *c == channel && m.channel_message_id.as_deref() == Some(channel_message_id)
            })
            .map(|(_, m)| m.clone()))
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut matching: Vec<Message> = messages
            .iter()
            .filter(|(_, m)| m.conversation_id == *conversation_id)
            .map(|(_, m)| m.clone())
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let skip = matching.len().saturating_sub(limit as usize);
        Ok(matching.split_off(skip))
    }

    async fn save(&self, channel: Channel, message: Message) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;

        if let Some(position) = messages.iter().position(|(_, m)| m.id == message.id) {
            messages[position] = (channel, message);
            return Ok(());
        }

        // Mirrors the partial unique index on (channel, channel_message_id).
        if let Some(dedup_key) = message.channel_message_id.as_deref() {
            let duplicate = messages.iter().any(|(c, m)| {
                *c == channel && m.channel_message_id.as_deref() == Some(dedup_key)
            });
            if duplicate {
                return Err(RepositoryError::Conflict(format!(
                    "duplicate channel message id: {dedup_key}"
                )));
            }
        }

        messages.push((channel, message));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOverrideRepository {
    overrides: RwLock<HashMap<String, TemporaryOverride>>,
}

fn priority_rank(row: &TemporaryOverride) -> u8 {
    row.priority as u8
}

#[async_trait::async_trait]
impl OverrideRepository for InMemoryOverrideRepository {
    async fn find_by_id(
        &self,
        id: &OverrideId,
    ) -> Result<Option<TemporaryOverride>, RepositoryError> {
        let overrides = self.overrides.read().await;
        Ok(overrides.get(&id.0).cloned())
    }

    async fn get_active(
        &self,
        org_id: &str,
        kind: Option<OverrideKind>,
    ) -> Result<Vec<TemporaryOverride>, RepositoryError> {
        let overrides = self.overrides.read().await;
        let mut rows: Vec<TemporaryOverride> = overrides
            .values()
            .filter(|o| o.org_id == org_id && o.active && kind.map_or(true, |k| o.kind == k))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            priority_rank(b).cmp(&priority_rank(a)).then(b.created_at.cmp(&a.created_at))
        });
        Ok(rows)
    }

    async fn create(&self, row: TemporaryOverride) -> Result<(), RepositoryError> {
        let mut overrides = self.overrides.write().await;
        overrides.insert(row.id.0.clone(), row);
        Ok(())
    }

    async fn create_replacing(
        &self,
        row: TemporaryOverride,
        deactivate_kind: Option<OverrideKind>,
    ) -> Result<(), RepositoryError> {
        // Single write-lock section keeps the swap atomic.
        let mut overrides = self.overrides.write().await;
        if let Some(kind) = deactivate_kind {
            for existing in overrides.values_mut() {
                if existing.org_id == row.org_id && existing.kind == kind {
                    existing.active = false;
                }
            }
        }
        overrides.insert(row.id.0.clone(), row);
        Ok(())
    }

    async fn deactivate(&self, id: &OverrideId) -> Result<bool, RepositoryError> {
        let mut overrides = self.overrides.write().await;
        match overrides.get_mut(&id.0) {
            Some(row) if row.active => {
                row.active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate_kind(
        &self,
        org_id: &str,
        kind: OverrideKind,
    ) -> Result<u32, RepositoryError> {
        let mut overrides = self.overrides.write().await;
        let mut flipped = 0;
        for row in overrides.values_mut() {
            if row.org_id == org_id && row.kind == kind && row.active {
                row.active = false;
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}

#[derive(Default)]
pub struct InMemoryPendingActionRepository {
    actions: RwLock<HashMap<String, PendingManagerAction>>,
}

#[async_trait::async_trait]
impl PendingActionRepository for InMemoryPendingActionRepository {
    async fn find_by_id(
        &self,
        id: &PendingActionId,
    ) -> Result<Option<PendingManagerAction>, RepositoryError> {
        let actions = self.actions.read().await;
        Ok(actions.get(&id.0).cloned())
    }

    async fn find_pending_for_manager(
        &self,
        org_id: &str,
        manager_id: &str,
    ) -> Result<Option<PendingManagerAction>, RepositoryError> {
        let actions = self.actions.read().await;
        Ok(actions
            .values()
            .filter(|a| {
                a.org_id == org_id
                    && a.manager_id == manager_id
                    && a.status == PendingActionStatus::Pending
            })
            .max_by(|a, b| a.created_at.cmp(&b.created_at))
            .cloned())
    }

    async fn save(&self, action: PendingManagerAction) -> Result<(), RepositoryError> {
        let mut actions = self.actions.write().await;

        // Mirrors the partial unique index on (org_id, manager_id).
        if action.status == PendingActionStatus::Pending {
            let conflicting = actions.values().any(|a| {
                a.id != action.id
                    && a.org_id == action.org_id
                    && a.manager_id == action.manager_id
                    && a.status == PendingActionStatus::Pending
            });
            if conflicting {
                return Err(RepositoryError::Conflict(format!(
                    "manager {} already has a pending action",
                    action.manager_id
                )));
            }
        }

        actions.insert(action.id.0.clone(), action);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryManagerQueryRepository {
    queries: RwLock<HashMap<String, ManagerQuery>>,
}

#[async_trait::async_trait]
impl ManagerQueryRepository for InMemoryManagerQueryRepository {
    async fn find_by_id(
        &self,
        id: &ManagerQueryId,
    ) -> Result<Option<ManagerQuery>, RepositoryError> {
        let queries = self.queries.read().await;
        Ok(queries.get(&id.0).cloned())
    }

    async fn find_open_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ManagerQuery>, RepositoryError> {
        let queries = self.queries.read().await;
        Ok(queries
            .values()
            .filter(|q| {
                q.conversation_id == *conversation_id
                    && (q.status == ManagerQueryStatus::Pending || q.has_unsent_answer())
            })
            .max_by(|a, b| a.created_at.cmp(&b.created_at))
            .cloned())
    }

    async fn find_pending_for_manager(
        &self,
        org_id: &str,
        manager_id: &str,
    ) -> Result<Option<ManagerQuery>, RepositoryError> {
        let queries = self.queries.read().await;
        Ok(queries
            .values()
            .filter(|q| {
                q.org_id == org_id
                    && q.manager_id == manager_id
                    && q.status == ManagerQueryStatus::Pending
            })
            .max_by(|a, b| a.created_at.cmp(&b.created_at))
            .cloned())
    }

    async fn save(&self, query: ManagerQuery) -> Result<(), RepositoryError> {
        let mut queries = self.queries.write().await;
        queries.insert(query.id.0.clone(), query);
        Ok(())
    }

    async fn mark_response_sent(&self, id: &ManagerQueryId) -> Result<bool, RepositoryError> {
        let mut queries = self.queries.write().await;
        match queries.get_mut(&id.0) {
            Some(query) if !query.response_sent => {
                query.response_sent = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryManagerRepository {
    managers: RwLock<HashMap<String, ManagerNumber>>,
}

#[async_trait::async_trait]
impl ManagerRepository for InMemoryManagerRepository {
    async fn find_by_id(&self, id: &ManagerId) -> Result<Option<ManagerNumber>, RepositoryError> {
        let managers = self.managers.read().await;
        Ok(managers.get(&id.0).cloned())
    }

    async fn resolve_by_phone(
        &self,
        org_id: &str,
        phone: &str,
    ) -> Result<Option<ManagerNumber>, RepositoryError> {
        if phone_tail(phone).is_empty() {
            return Ok(None);
        }

        let managers = self.managers.read().await;
        Ok(managers
            .values()
            .filter(|m| m.org_id == org_id && m.matches_phone(phone))
            .max_by(|a, b| a.last_active_at.cmp(&b.last_active_at))
            .cloned())
    }

    async fn find_for_location(
        &self,
        org_id: &str,
        location_id: &str,
    ) -> Result<Option<ManagerNumber>, RepositoryError> {
        let managers = self.managers.read().await;
        Ok(managers
            .values()
            .filter(|m| m.org_id == org_id && m.location_id.as_deref() == Some(location_id))
            .max_by(|a, b| a.last_active_at.cmp(&b.last_active_at))
            .cloned())
    }

    async fn most_recently_active(
        &self,
        org_id: &str,
    ) -> Result<Option<ManagerNumber>, RepositoryError> {
        let managers = self.managers.read().await;
        Ok(managers
            .values()
            .filter(|m| m.org_id == org_id && m.can_answer_queries)
            .max_by(|a, b| a.last_active_at.cmp(&b.last_active_at))
            .cloned())
    }

    async fn save(&self, manager: ManagerNumber) -> Result<(), RepositoryError> {
        let mut managers = self.managers.write().await;
        managers.insert(manager.id.0.clone(), manager);
        Ok(())
    }

    async fn touch_activity(
        &self,
        id: &ManagerId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut managers = self.managers.write().await;
        if let Some(manager) = managers.get_mut(&id.0) {
            manager.touch(now);
        }
        Ok(())
    }
}
