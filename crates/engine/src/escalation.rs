use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use frontdesk_channels::sender::{send_with_retry, ChannelSender};
use frontdesk_channels::templates;
use frontdesk_core::domain::conversation::{Channel, Conversation, ConversationId};
use frontdesk_core::domain::manager::ManagerNumber;
use frontdesk_core::domain::query::{ManagerQuery, ManagerQueryId, ManagerQueryStatus};
use frontdesk_core::errors::{DomainError, EngineError};
use frontdesk_db::repositories::{ManagerQueryRepository, ManagerRepository};

use crate::persistence;
use crate::responder::{polish_manager_reply, InferenceClient};

/// What the pending-query check found for a conversation. `StillWaiting`
/// suppresses normal handling so the customer never gets a second automated
/// answer while a manager is on the hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EscalationCheck {
    Answered(String),
    ExpiredFallback(String),
    StillWaiting,
    Clear,
}

pub struct EscalationCoordinator {
    queries: Arc<dyn ManagerQueryRepository>,
    managers: Arc<dyn ManagerRepository>,
    sender: Arc<dyn ChannelSender>,
}

impl EscalationCoordinator {
    pub fn new(
        queries: Arc<dyn ManagerQueryRepository>,
        managers: Arc<dyn ManagerRepository>,
        sender: Arc<dyn ChannelSender>,
    ) -> Self {
        Self { queries, managers, sender }
    }

    /// Location-linked manager first, else the most recently active one with
    /// the answer capability.
    async fn select_manager(
        &self,
        org_id: &str,
        conversation: &Conversation,
    ) -> Result<Option<ManagerNumber>, EngineError> {
        if let Some(location) =
            conversation.metadata.get("location_id").and_then(|value| value.as_str())
        {
            if let Some(manager) = self
                .managers
                .find_for_location(org_id, location)
                .await
                .map_err(persistence)?
            {
                return Ok(Some(manager));
            }
        }

        self.managers.most_recently_active(org_id).await.map_err(persistence)
    }

    /// Opens a time-boxed query and notifies the selected manager. Returns
    /// `None` when no manager exists or the notification could not be
    /// delivered; in that case the caller must not promise the customer a
    /// manager response.
    pub async fn escalate(
        &self,
        org_id: &str,
        conversation: &Conversation,
        customer_name: &str,
        customer_text: &str,
        wait_window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<ManagerQuery>, EngineError> {
        let Some(manager) = self.select_manager(org_id, conversation).await? else {
            tracing::warn!(
                event_name = "escalation_no_manager",
                org_id,
                conversation_id = %conversation.id.0,
            );
            return Ok(None);
        };

        let mut query = ManagerQuery {
            id: ManagerQueryId::generate(),
            org_id: org_id.to_owned(),
            conversation_id: conversation.id.clone(),
            manager_id: manager.id.0.clone(),
            customer_text: customer_text.to_owned(),
            status: ManagerQueryStatus::Pending,
            manager_response: None,
            customer_response: None,
            response_sent: false,
            created_at: now,
            expires_at: now + wait_window,
            answered_at: None,
        };
        self.queries.save(query.clone()).await.map_err(persistence)?;

        let notification = templates::manager_query_notification(customer_name, customer_text);
        let delivery =
            send_with_retry(self.sender.as_ref(), Channel::Whatsapp, &manager.phone, &notification)
                .await;

        if let Err(error) = delivery {
            tracing::warn!(
                event_name = "escalation_notify_failed",
                manager_id = %manager.id.0,
                error = %error,
            );
            query.status = ManagerQueryStatus::Cancelled;
            self.queries.save(query).await.map_err(persistence)?;
            return Ok(None);
        }

        tracing::info!(
            event_name = "escalation_opened",
            conversation_id = %conversation.id.0,
            manager_id = %manager.id.0,
            query_id = %query.id.0,
        );
        Ok(Some(query))
    }

    /// Runs before normal handling on every inbound customer message. The
    /// answered branch flips the sent flag in a guarded update so the text
    /// surfaces exactly once; expiry is applied lazily here.
    pub async fn check_pending(
        &self,
        conversation_id: &ConversationId,
        now: DateTime<Utc>,
    ) -> Result<EscalationCheck, EngineError> {
        let Some(mut query) = self
            .queries
            .find_open_for_conversation(conversation_id)
            .await
            .map_err(persistence)?
        else {
            return Ok(EscalationCheck::Clear);
        };

        if query.has_unsent_answer() {
            let won = self.queries.mark_response_sent(&query.id).await.map_err(persistence)?;
            if !won {
                return Ok(EscalationCheck::Clear);
            }
            let text = query
                .customer_response
                .ok_or_else(|| {
                    DomainError::InvariantViolation(
                        "answered query without customer response".to_owned(),
                    )
                })?;
            return Ok(EscalationCheck::Answered(text));
        }

        if query.is_expired(now) {
            query.status = ManagerQueryStatus::Expired;
            self.queries.save(query).await.map_err(persistence)?;
            return Ok(EscalationCheck::ExpiredFallback(templates::escalation_expiry_fallback()));
        }

        if query.status == ManagerQueryStatus::Pending {
            return Ok(EscalationCheck::StillWaiting);
        }

        Ok(EscalationCheck::Clear)
    }

    /// Stores the manager's raw reply, produces the customer-facing phrasing,
    /// and marks the query ready to send on the next customer message.
    pub async fn record_manager_response(
        &self,
        query_id: &ManagerQueryId,
        raw_text: &str,
        inference: &dyn InferenceClient,
        now: DateTime<Utc>,
    ) -> Result<ManagerQuery, EngineError> {
        let mut query = self
            .queries
            .find_by_id(query_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| EngineError::NotFound(format!("manager query {}", query_id.0)))?;

        if query.status != ManagerQueryStatus::Pending {
            return Err(DomainError::InvariantViolation(format!(
                "query {} is already {}",
                query.id.0,
                query.status.as_str()
            ))
            .into());
        }

        let customer_facing =
            polish_manager_reply(inference, &query.customer_text, raw_text).await;

        query.status = ManagerQueryStatus::Answered;
        query.manager_response = Some(raw_text.to_owned());
        query.customer_response = Some(customer_facing);
        query.answered_at = Some(now);
        self.queries.save(query.clone()).await.map_err(persistence)?;

        tracing::info!(
            event_name = "escalation_answered",
            query_id = %query.id.0,
            manager_id = %query.manager_id,
        );
        Ok(query)
    }
}
