use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use frontdesk_core::domain::conversation::{Channel, Conversation, ConversationId};
use frontdesk_core::domain::manager::{ManagerId, ManagerNumber};
use frontdesk_core::domain::message::Message;
use frontdesk_core::domain::overrides::{OverrideId, OverrideKind, TemporaryOverride};
use frontdesk_core::domain::pending::{PendingActionId, PendingManagerAction};
use frontdesk_core::domain::query::{ManagerQuery, ManagerQueryId};

pub mod conversation;
pub mod escalation;
pub mod manager;
pub mod memory;
pub mod override_store;

pub use conversation::{SqlConversationRepository, SqlMessageRepository};
pub use escalation::{SqlManagerQueryRepository, SqlPendingActionRepository};
pub use manager::SqlManagerRepository;
pub use memory::{
    InMemoryConversationRepository, InMemoryManagerQueryRepository, InMemoryManagerRepository,
    InMemoryMessageRepository, InMemoryOverrideRepository, InMemoryPendingActionRepository,
};
pub use override_store::SqlOverrideRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// RFC3339 column decode. A corrupt timestamp is a decode failure; it must
/// never be silently remapped, because expiry windows depend on it.
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("bad timestamp `{value}`: {error}")))
}

pub(crate) fn parse_timestamp_opt(
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.as_deref().map(parse_timestamp).transpose()
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// The single open conversation for `(org, channel, external_id)`, if any.
    /// Archived conversations never match.
    async fn find_open(
        &self,
        org_id: &str,
        channel: Channel,
        external_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError>;

    async fn save(&self, conversation: Conversation) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Dedup lookup keyed by `(channel, channel_message_id)`.
    async fn find_by_channel_message_id(
        &self,
        channel: Channel,
        channel_message_id: &str,
    ) -> Result<Option<Message>, RepositoryError>;

    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn save(&self, channel: Channel, message: Message) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OverrideRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &OverrideId,
    ) -> Result<Option<TemporaryOverride>, RepositoryError>;

    /// Active rows for the organization, optionally filtered to one kind,
    /// ordered priority-descending then created_at-descending. Window expiry
    /// is the caller's concern (lazy, at read time).
    async fn get_active(
        &self,
        org_id: &str,
        kind: Option<OverrideKind>,
    ) -> Result<Vec<TemporaryOverride>, RepositoryError>;

    async fn create(&self, row: TemporaryOverride) -> Result<(), RepositoryError>;

    /// Deactivate every active row of `deactivate_kind` and create `row`, as
    /// one atomic unit. Customers must never observe the in-between state
    /// where both the old and the new status row are active.
    async fn create_replacing(
        &self,
        row: TemporaryOverride,
        deactivate_kind: Option<OverrideKind>,
    ) -> Result<(), RepositoryError>;

    /// Returns false when the row was already inactive or missing.
    async fn deactivate(&self, id: &OverrideId) -> Result<bool, RepositoryError>;

    async fn deactivate_kind(
        &self,
        org_id: &str,
        kind: OverrideKind,
    ) -> Result<u32, RepositoryError>;
}

#[async_trait]
pub trait PendingActionRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &PendingActionId,
    ) -> Result<Option<PendingManagerAction>, RepositoryError>;

    async fn find_pending_for_manager(
        &self,
        org_id: &str,
        manager_id: &str,
    ) -> Result<Option<PendingManagerAction>, RepositoryError>;

    async fn save(&self, action: PendingManagerAction) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ManagerQueryRepository: Send + Sync {
    async fn find_by_id(&self, id: &ManagerQueryId)
        -> Result<Option<ManagerQuery>, RepositoryError>;

    /// The query currently driving customer-facing wait behavior: the latest
    /// PENDING or ANSWERED-but-unsent row for the conversation.
    async fn find_open_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ManagerQuery>, RepositoryError>;

    /// The latest PENDING query assigned to this manager, used to route a
    /// manager's free-form reply as an answer.
    async fn find_pending_for_manager(
        &self,
        org_id: &str,
        manager_id: &str,
    ) -> Result<Option<ManagerQuery>, RepositoryError>;

    async fn save(&self, query: ManagerQuery) -> Result<(), RepositoryError>;

    /// Guarded flip of the sent flag; returns true only for the caller that
    /// won the race, so the answered text surfaces exactly once.
    async fn mark_response_sent(&self, id: &ManagerQueryId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ManagerRepository: Send + Sync {
    async fn find_by_id(&self, id: &ManagerId) -> Result<Option<ManagerNumber>, RepositoryError>;

    /// Identity lookup by normalized last-10-digit comparison.
    async fn resolve_by_phone(
        &self,
        org_id: &str,
        phone: &str,
    ) -> Result<Option<ManagerNumber>, RepositoryError>;

    async fn find_for_location(
        &self,
        org_id: &str,
        location_id: &str,
    ) -> Result<Option<ManagerNumber>, RepositoryError>;

    /// Most recently active manager holding the answer-queries capability.
    async fn most_recently_active(
        &self,
        org_id: &str,
    ) -> Result<Option<ManagerNumber>, RepositoryError>;

    async fn save(&self, manager: ManagerNumber) -> Result<(), RepositoryError>;

    async fn touch_activity(
        &self,
        id: &ManagerId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}
