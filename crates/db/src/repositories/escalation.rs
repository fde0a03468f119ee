use sqlx::Row;

use frontdesk_core::domain::conversation::ConversationId;
use frontdesk_core::domain::pending::{
    ActionContext, ManagerActionKind, PendingActionId, PendingActionStatus, PendingManagerAction,
};
use frontdesk_core::domain::query::{ManagerQuery, ManagerQueryId, ManagerQueryStatus};

use super::{
    parse_timestamp, parse_timestamp_opt, ManagerQueryRepository, PendingActionRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlPendingActionRepository {
    pool: DbPool,
}

impl SqlPendingActionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_pending_action(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<PendingManagerAction, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let org_id: String =
        row.try_get("org_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_id: String =
        row.try_get("manager_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind_str: String =
        row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let original_message: String =
        row.try_get("original_message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let context_str: String =
        row.try_get("context").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let expires_at_str: String =
        row.try_get("expires_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let confirmed_at_str: Option<String> =
        row.try_get("confirmed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let kind = ManagerActionKind::parse(&kind_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown action kind: {kind_str}")))?;
    let status = PendingActionStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown action status: {status_str}")))?;
    let context: ActionContext = serde_json::from_str(&context_str).unwrap_or_default();
    let confirmed_at = parse_timestamp_opt(confirmed_at_str)?;

    Ok(PendingManagerAction {
        id: PendingActionId(id),
        org_id,
        manager_id,
        kind,
        status,
        original_message,
        context,
        created_at: parse_timestamp(&created_at_str)?,
        expires_at: parse_timestamp(&expires_at_str)?,
        confirmed_at,
    })
}

#[async_trait::async_trait]
impl PendingActionRepository for SqlPendingActionRepository {
    async fn find_by_id(
        &self,
        id: &PendingActionId,
    ) -> Result<Option<PendingManagerAction>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, org_id, manager_id, kind, status, original_message, context,
                    created_at, expires_at, confirmed_at
             FROM pending_action WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_pending_action(r)?)),
            None => Ok(None),
        }
    }

    async fn find_pending_for_manager(
        &self,
        org_id: &str,
        manager_id: &str,
    ) -> Result<Option<PendingManagerAction>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, org_id, manager_id, kind, status, original_message, context,
                    created_at, expires_at, confirmed_at
             FROM pending_action
             WHERE org_id = ? AND manager_id = ? AND status = 'pending'
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(org_id)
        .bind(manager_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_pending_action(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, action: PendingManagerAction) -> Result<(), RepositoryError> {
        let context_str = serde_json::to_string(&action.context)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let confirmed_at_str = action.confirmed_at.map(|dt| dt.to_rfc3339());

        sqlx::query(
            "INSERT INTO pending_action (id, org_id, manager_id, kind, status,
                                         original_message, context, created_at,
                                         expires_at, confirmed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 context = excluded.context,
                 expires_at = excluded.expires_at,
                 confirmed_at = excluded.confirmed_at",
        )
        .bind(&action.id.0)
        .bind(&action.org_id)
        .bind(&action.manager_id)
        .bind(action.kind.as_str())
        .bind(action.status.as_str())
        .bind(&action.original_message)
        .bind(&context_str)
        .bind(action.created_at.to_rfc3339())
        .bind(action.expires_at.to_rfc3339())
        .bind(&confirmed_at_str)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub struct SqlManagerQueryRepository {
    pool: DbPool,
}

impl SqlManagerQueryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_query(row: &sqlx::sqlite::SqliteRow) -> Result<ManagerQuery, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let org_id: String =
        row.try_get("org_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversation_id: String =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_id: String =
        row.try_get("manager_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_text: String =
        row.try_get("customer_text").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_response: Option<String> =
        row.try_get("manager_response").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_response: Option<String> =
        row.try_get("customer_response").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let response_sent: i64 =
        row.try_get("response_sent").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let expires_at_str: String =
        row.try_get("expires_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let answered_at_str: Option<String> =
        row.try_get("answered_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = ManagerQueryStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown query status: {status_str}")))?;
    let answered_at = parse_timestamp_opt(answered_at_str)?;

    Ok(ManagerQuery {
        id: ManagerQueryId(id),
        org_id,
        conversation_id: ConversationId(conversation_id),
        manager_id,
        customer_text,
        status,
        manager_response,
        customer_response,
        response_sent: response_sent != 0,
        created_at: parse_timestamp(&created_at_str)?,
        expires_at: parse_timestamp(&expires_at_str)?,
        answered_at,
    })
}

#[async_trait::async_trait]
impl ManagerQueryRepository for SqlManagerQueryRepository {
    async fn find_by_id(
        &self,
        id: &ManagerQueryId,
    ) -> Result<Option<ManagerQuery>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, org_id, conversation_id, manager_id, customer_text, status,
                    manager_response, customer_response, response_sent,
                    created_at, expires_at, answered_at
             FROM manager_query WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_query(r)?)),
            None => Ok(None),
        }
    }

    async fn find_open_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ManagerQuery>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, org_id, conversation_id, manager_id, customer_text, status,
                    manager_response, customer_response, response_sent,
                    created_at, expires_at, answered_at
             FROM manager_query
             WHERE conversation_id = ?
               AND (status = 'pending' OR (status = 'answered' AND response_sent = 0))
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(&conversation_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_query(r)?)),
            None => Ok(None),
        }
    }

    async fn find_pending_for_manager(
        &self,
        org_id: &str,
        manager_id: &str,
    ) -> Result<Option<ManagerQuery>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, org_id, conversation_id, manager_id, customer_text, status,
                    manager_response, customer_response, response_sent,
                    created_at, expires_at, answered_at
             FROM manager_query
             WHERE org_id = ? AND manager_id = ? AND status = 'pending'
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(org_id)
        .bind(manager_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_query(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, query: ManagerQuery) -> Result<(), RepositoryError> {
        let answered_at_str = query.answered_at.map(|dt| dt.to_rfc3339());

        sqlx::query(
            "INSERT INTO manager_query (id, org_id, conversation_id, manager_id,
                                        customer_text, status, manager_response,
                                        customer_response, response_sent,
                                        created_at, expires_at, answered_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 manager_response = excluded.manager_response,
                 customer_response = excluded.customer_response,
                 response_sent = excluded.response_sent,
                 answered_at = excluded.answered_at",
        )
        .bind(&query.id.0)
        .bind(&query.org_id)
        .bind(&query.conversation_id.0)
        .bind(&query.manager_id)
        .bind(&query.customer_text)
        .bind(query.status.as_str())
        .bind(&query.manager_response)
        .bind(&query.customer_response)
        .bind(query.response_sent)
        .bind(query.created_at.to_rfc3339())
        .bind(query.expires_at.to_rfc3339())
        .bind(&answered_at_str)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_response_sent(&self, id: &ManagerQueryId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE manager_query SET response_sent = 1 WHERE id = ? AND response_sent = 0",
        )
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use frontdesk_core::domain::conversation::{Channel, Conversation, ConversationId};
    use frontdesk_core::domain::pending::{
        ActionContext, ManagerActionKind, OverrideDraft, PendingActionId, PendingActionStatus,
        PendingManagerAction,
    };
    use frontdesk_core::domain::query::{ManagerQuery, ManagerQueryId, ManagerQueryStatus};
    use frontdesk_core::domain::overrides::{OverrideKind, OverridePriority};

    use super::{SqlManagerQueryRepository, SqlPendingActionRepository};
    use crate::repositories::{
        ConversationRepository, ManagerQueryRepository, PendingActionRepository,
        SqlConversationRepository,
    };
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    async fn insert_conversation(pool: &sqlx::SqlitePool, id: &str) -> ConversationId {
        let repo = SqlConversationRepository::new(pool.clone());
        let mut conversation =
            Conversation::open("org-1", Channel::Whatsapp, id.to_owned(), Utc::now());
        conversation.id = ConversationId(id.to_owned());
        repo.save(conversation.clone()).await.expect("insert parent conversation");
        conversation.id
    }

    fn sample_action(id: &str, manager_id: &str) -> PendingManagerAction {
        let now = Utc::now();
        PendingManagerAction {
            id: PendingActionId(id.to_owned()),
            org_id: "org-1".to_owned(),
            manager_id: manager_id.to_owned(),
            kind: ManagerActionKind::CloseBusiness,
            status: PendingActionStatus::Pending,
            original_message: "closing early today".to_owned(),
            context: ActionContext {
                booking_count: 2,
                booking_summaries: vec!["14:00 table for 4".to_owned()],
                override_request: Some(OverrideDraft {
                    kind: OverrideKind::Hours,
                    priority: OverridePriority::Urgent,
                    original_text: "closing early today".to_owned(),
                    customer_text: "We are closed for the rest of today.".to_owned(),
                    keywords: vec!["open".to_owned()],
                    ttl_minutes: 480,
                    expire_on_reopen: true,
                }),
            },
            created_at: now,
            expires_at: now + Duration::minutes(10),
            confirmed_at: None,
        }
    }

    fn sample_query(id: &str, conversation_id: &ConversationId) -> ManagerQuery {
        let now = Utc::now();
        ManagerQuery {
            id: ManagerQueryId(id.to_owned()),
            org_id: "org-1".to_owned(),
            conversation_id: conversation_id.clone(),
            manager_id: "mgr-1".to_owned(),
            customer_text: "do you allow dogs?".to_owned(),
            status: ManagerQueryStatus::Pending,
            manager_response: None,
            customer_response: None,
            response_sent: false,
            created_at: now,
            expires_at: now + Duration::minutes(15),
            answered_at: None,
        }
    }

    #[tokio::test]
    async fn pending_action_round_trips_typed_context() {
        let pool = setup().await;
        let repo = SqlPendingActionRepository::new(pool);

        let action = sample_action("pa-1", "mgr-1");
        repo.save(action.clone()).await.expect("save");

        let found =
            repo.find_by_id(&action.id).await.expect("find").expect("should exist");
        assert_eq!(found.kind, ManagerActionKind::CloseBusiness);
        assert_eq!(found.context.booking_count, 2);
        let draft = found.context.override_request.expect("draft survives");
        assert_eq!(draft.kind, OverrideKind::Hours);
        assert_eq!(draft.ttl_minutes, 480);
    }

    #[tokio::test]
    async fn one_pending_action_per_manager_is_enforced_by_schema() {
        let pool = setup().await;
        let repo = SqlPendingActionRepository::new(pool);

        repo.save(sample_action("pa-1", "mgr-1")).await.expect("save first");

        let second = repo.save(sample_action("pa-2", "mgr-1")).await;
        assert!(second.is_err());

        // A resolved row frees the slot.
        let mut first = sample_action("pa-1", "mgr-1");
        first.status = PendingActionStatus::Confirmed;
        first.confirmed_at = Some(Utc::now());
        repo.save(first).await.expect("confirm first");
        repo.save(sample_action("pa-2", "mgr-1")).await.expect("save second");
    }

    #[tokio::test]
    async fn find_pending_for_manager_skips_resolved_rows() {
        let pool = setup().await;
        let repo = SqlPendingActionRepository::new(pool);

        let mut confirmed = sample_action("pa-1", "mgr-1");
        confirmed.status = PendingActionStatus::Confirmed;
        repo.save(confirmed).await.expect("save confirmed");

        assert!(repo
            .find_pending_for_manager("org-1", "mgr-1")
            .await
            .expect("find")
            .is_none());

        repo.save(sample_action("pa-2", "mgr-1")).await.expect("save pending");
        let pending = repo
            .find_pending_for_manager("org-1", "mgr-1")
            .await
            .expect("find")
            .expect("pending exists");
        assert_eq!(pending.id.0, "pa-2");
    }

    #[tokio::test]
    async fn open_query_lookup_covers_pending_and_unsent_answers() {
        let pool = setup().await;
        let conversation_id = insert_conversation(&pool, "c-1").await;
        let repo = SqlManagerQueryRepository::new(pool);

        let mut query = sample_query("q-1", &conversation_id);
        repo.save(query.clone()).await.expect("save pending");

        let open = repo
            .find_open_for_conversation(&conversation_id)
            .await
            .expect("find")
            .expect("pending drives waiting");
        assert_eq!(open.id.0, "q-1");

        query.status = ManagerQueryStatus::Answered;
        query.manager_response = Some("yes dogs ok".to_owned());
        query.customer_response = Some("Yes, dogs are welcome.".to_owned());
        query.answered_at = Some(Utc::now());
        repo.save(query.clone()).await.expect("save answered");

        let open = repo
            .find_open_for_conversation(&conversation_id)
            .await
            .expect("find")
            .expect("unsent answer still open");
        assert!(open.has_unsent_answer());

        repo.mark_response_sent(&query.id).await.expect("mark sent");
        assert!(repo
            .find_open_for_conversation(&conversation_id)
            .await
            .expect("find")
            .is_none());
    }

    #[tokio::test]
    async fn mark_response_sent_flips_exactly_once() {
        let pool = setup().await;
        let conversation_id = insert_conversation(&pool, "c-1").await;
        let repo = SqlManagerQueryRepository::new(pool);

        let mut query = sample_query("q-1", &conversation_id);
        query.status = ManagerQueryStatus::Answered;
        query.customer_response = Some("Yes, dogs are welcome.".to_owned());
        repo.save(query.clone()).await.expect("save");

        assert!(repo.mark_response_sent(&query.id).await.expect("first send"));
        assert!(!repo.mark_response_sent(&query.id).await.expect("second send"));

        let found =
            repo.find_by_id(&query.id).await.expect("find").expect("should exist");
        assert!(found.response_sent);
    }

    #[tokio::test]
    async fn manager_reply_routing_picks_latest_pending_query() {
        let pool = setup().await;
        let c1 = insert_conversation(&pool, "c-1").await;
        let c2 = insert_conversation(&pool, "c-2").await;
        let repo = SqlManagerQueryRepository::new(pool);

        let mut older = sample_query("q-old", &c1);
        older.created_at = Utc::now() - Duration::minutes(5);
        repo.save(older).await.expect("save older");
        repo.save(sample_query("q-new", &c2)).await.expect("save newer");

        let routed = repo
            .find_pending_for_manager("org-1", "mgr-1")
            .await
            .expect("find")
            .expect("pending exists");
        assert_eq!(routed.id.0, "q-new");
    }
}
