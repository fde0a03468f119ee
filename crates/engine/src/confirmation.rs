use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use frontdesk_channels::templates;
use frontdesk_core::domain::pending::{
    ActionContext, ManagerActionKind, PendingActionId, PendingActionStatus, PendingManagerAction,
};
use frontdesk_core::errors::EngineError;
use frontdesk_core::phrases::{PhraseVocabulary, ReplyIntent};
use frontdesk_db::repositories::{PendingActionRepository, RepositoryError};

use crate::persistence;

#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error("manager already has a pending action awaiting reply")]
    AlreadyPending,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// How the manager's next message resolved (or failed to resolve) their
/// pending action. `Confirmed` hands the action back so the caller can
/// execute the guarded side effect.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplyOutcome {
    Confirmed(PendingManagerAction),
    Cancelled(PendingManagerAction),
    Reprompt(String),
}

pub struct ConfirmationWorkflow {
    actions: Arc<dyn PendingActionRepository>,
    vocabulary: PhraseVocabulary,
}

impl ConfirmationWorkflow {
    pub fn new(actions: Arc<dyn PendingActionRepository>, vocabulary: PhraseVocabulary) -> Self {
        Self { actions, vocabulary }
    }

    fn action_summary(kind: ManagerActionKind) -> &'static str {
        match kind {
            ManagerActionKind::CloseBusiness => "you asked to close the business",
            ManagerActionKind::ReopenBusiness => "you asked to reopen the business",
            ManagerActionKind::DeactivateOverride => "you asked to remove a status update",
        }
    }

    /// Creates the pending gate, or fails with `AlreadyPending` if an
    /// unexpired one exists. A stale pending row is expired lazily first.
    pub async fn request_confirmation(
        &self,
        org_id: &str,
        manager_id: &str,
        kind: ManagerActionKind,
        original_message: &str,
        context: ActionContext,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(PendingManagerAction, String), ConfirmationError> {
        if let Some(mut existing) = self
            .actions
            .find_pending_for_manager(org_id, manager_id)
            .await
            .map_err(persistence)?
        {
            if existing.is_awaiting_reply(now) {
                return Err(ConfirmationError::AlreadyPending);
            }
            existing.status = PendingActionStatus::Expired;
            self.actions.save(existing).await.map_err(persistence)?;
        }

        let action = PendingManagerAction {
            id: PendingActionId::generate(),
            org_id: org_id.to_owned(),
            manager_id: manager_id.to_owned(),
            kind,
            status: PendingActionStatus::Pending,
            original_message: original_message.to_owned(),
            context,
            created_at: now,
            expires_at: now + ttl,
            confirmed_at: None,
        };

        // The unique index backs up the check-then-create path under races.
        match self.actions.save(action.clone()).await {
            Ok(()) => {}
            Err(RepositoryError::Conflict(_)) => return Err(ConfirmationError::AlreadyPending),
            Err(RepositoryError::Database(error))
                if error.as_database_error().is_some_and(|e| e.is_unique_violation()) =>
            {
                return Err(ConfirmationError::AlreadyPending);
            }
            Err(error) => return Err(persistence(error).into()),
        }

        let prompt = templates::confirmation_prompt(
            Self::action_summary(action.kind),
            action.context.booking_count,
            &action.context.booking_summaries,
        );
        Ok((action, prompt))
    }

    /// Interprets a manager message against their pending action. `None`
    /// means no live pending action claimed the message and it should flow
    /// on as a fresh command; expired gates are retired here and ignored.
    pub async fn handle_reply(
        &self,
        org_id: &str,
        manager_id: &str,
        reply: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ReplyOutcome>, EngineError> {
        let Some(mut action) = self
            .actions
            .find_pending_for_manager(org_id, manager_id)
            .await
            .map_err(persistence)?
        else {
            return Ok(None);
        };

        if action.is_expired(now) {
            action.status = PendingActionStatus::Expired;
            self.actions.save(action).await.map_err(persistence)?;
            return Ok(None);
        }

        match self.vocabulary.classify(reply) {
            ReplyIntent::Confirm => {
                action.status = PendingActionStatus::Confirmed;
                action.confirmed_at = Some(now);
                self.actions.save(action.clone()).await.map_err(persistence)?;
                tracing::info!(
                    event_name = "pending_action_confirmed",
                    action_id = %action.id.0,
                    kind = action.kind.as_str(),
                );
                Ok(Some(ReplyOutcome::Confirmed(action)))
            }
            ReplyIntent::Cancel => {
                action.status = PendingActionStatus::Cancelled;
                self.actions.save(action.clone()).await.map_err(persistence)?;
                tracing::info!(
                    event_name = "pending_action_cancelled",
                    action_id = %action.id.0,
                );
                Ok(Some(ReplyOutcome::Cancelled(action)))
            }
            ReplyIntent::Ambiguous => {
                Ok(Some(ReplyOutcome::Reprompt(templates::confirmation_reprompt())))
            }
        }
    }
}
