use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use frontdesk_core::config::EngineConfig;
use frontdesk_core::domain::manager::ManagerNumber;
use frontdesk_core::domain::overrides::{
    OverrideId, OverrideKind, OverridePriority, TemporaryOverride,
};
use frontdesk_core::domain::pending::{
    ActionContext, ManagerActionKind, OverrideDraft, PendingManagerAction,
};
use frontdesk_core::domain::query::ManagerQueryStatus;
use frontdesk_core::errors::EngineError;
use frontdesk_db::repositories::{ManagerQueryRepository, OverrideRepository};

use crate::confirmation::{ConfirmationError, ConfirmationWorkflow, ReplyOutcome};
use crate::escalation::EscalationCoordinator;
use crate::persistence;
use crate::responder::InferenceClient;

/// Read-only view onto the booking system, injected so the close guard can be
/// exercised without dragging booking persistence into scope.
#[async_trait]
pub trait BookingDirectory: Send + Sync {
    async fn confirmed_today(&self, org_id: &str) -> Result<(u32, Vec<String>), EngineError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManagerCommand {
    Close { reason: Option<String> },
    Open,
    Note { text: String },
    Unavailable { text: String },
    Status,
    Unknown { text: String },
}

/// Verb-first parsing with a phrase fallback, so both "close boiler broke"
/// and "we're closing early today" land on the same command.
pub fn parse_manager_command(text: &str) -> ManagerCommand {
    let trimmed = text.trim();
    let lowered = trimmed.to_lowercase();
    let mut parts = trimmed.split_whitespace();
    let verb = parts.next().unwrap_or_default().to_ascii_lowercase();
    let rest = parts.collect::<Vec<_>>().join(" ");

    match verb.as_str() {
        "close" | "closed" | "closing" => {
            return ManagerCommand::Close {
                reason: if rest.is_empty() { None } else { Some(rest) },
            };
        }
        "open" | "reopen" => return ManagerCommand::Open,
        "note" if !rest.is_empty() => return ManagerCommand::Note { text: rest },
        "unavailable" if !rest.is_empty() => return ManagerCommand::Unavailable { text: rest },
        "status" => return ManagerCommand::Status,
        _ => {}
    }

    if lowered.contains("clos") {
        return ManagerCommand::Close { reason: Some(trimmed.to_owned()) };
    }
    if lowered.contains("reopen") || lowered.contains("back open") || lowered.contains("open again")
    {
        return ManagerCommand::Open;
    }

    ManagerCommand::Unknown { text: trimmed.to_owned() }
}

pub struct ManagerCommandProcessor {
    overrides: Arc<dyn OverrideRepository>,
    queries: Arc<dyn ManagerQueryRepository>,
    confirmation: Arc<ConfirmationWorkflow>,
    escalation: Arc<EscalationCoordinator>,
    bookings: Arc<dyn BookingDirectory>,
    inference: Arc<dyn InferenceClient>,
    config: EngineConfig,
}

impl ManagerCommandProcessor {
    pub fn new(
        overrides: Arc<dyn OverrideRepository>,
        queries: Arc<dyn ManagerQueryRepository>,
        confirmation: Arc<ConfirmationWorkflow>,
        escalation: Arc<EscalationCoordinator>,
        bookings: Arc<dyn BookingDirectory>,
        inference: Arc<dyn InferenceClient>,
        config: EngineConfig,
    ) -> Self {
        Self { overrides, queries, confirmation, escalation, bookings, inference, config }
    }

    /// Routes one manager message. Confirm/cancel replies and answers to an
    /// open escalation query take precedence over new commands.
    pub async fn handle(
        &self,
        manager: &ManagerNumber,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<String, EngineError> {
        if let Some(outcome) = self
            .confirmation
            .handle_reply(&manager.org_id, &manager.id.0, text, now)
            .await?
        {
            return match outcome {
                ReplyOutcome::Confirmed(action) => self.execute_confirmed(manager, action, now).await,
                ReplyOutcome::Cancelled(_) => {
                    Ok("Okay, cancelled — nothing has been changed.".to_owned())
                }
                ReplyOutcome::Reprompt(prompt) => Ok(prompt),
            };
        }

        if let Some(mut query) = self
            .queries
            .find_pending_for_manager(&manager.org_id, &manager.id.0)
            .await
            .map_err(persistence)?
        {
            if query.is_expired(now) {
                query.status = ManagerQueryStatus::Expired;
                self.queries.save(query).await.map_err(persistence)?;
            } else if manager.can_answer_queries {
                self.escalation
                    .record_manager_response(&query.id, text, self.inference.as_ref(), now)
                    .await?;
                return Ok(
                    "Thanks — I'll pass that on to the customer right away.".to_owned()
                );
            }
        }

        match parse_manager_command(text) {
            ManagerCommand::Close { reason } => self.handle_close(manager, text, reason, now).await,
            ManagerCommand::Open => self.handle_open(manager, now).await,
            ManagerCommand::Note { text: note } => {
                self.create_simple_override(manager, OverrideKind::General, note, now).await
            }
            ManagerCommand::Unavailable { text: detail } => {
                self.create_simple_override(manager, OverrideKind::Availability, detail, now).await
            }
            ManagerCommand::Status => self.handle_status(manager, now).await,
            ManagerCommand::Unknown { .. } => Ok(
                "I didn't catch that. You can send: close [reason], open, \
                 note <update>, unavailable <detail>, or status."
                    .to_owned(),
            ),
        }
    }

    fn close_draft(&self, original: &str, reason: Option<&str>) -> OverrideDraft {
        let customer_text = match reason {
            Some(reason) => {
                format!("We are currently closed ({reason}). Apologies for any inconvenience.")
            }
            None => "We are currently closed. Apologies for any inconvenience.".to_owned(),
        };
        OverrideDraft {
            kind: OverrideKind::Hours,
            priority: OverridePriority::Urgent,
            original_text: original.to_owned(),
            customer_text,
            keywords: vec!["open".to_owned(), "closed".to_owned(), "hours".to_owned()],
            ttl_minutes: self.config.default_override_ttl_minutes,
            expire_on_reopen: true,
        }
    }

    fn draft_to_row(
        draft: &OverrideDraft,
        org_id: &str,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> TemporaryOverride {
        TemporaryOverride {
            id: OverrideId::generate(),
            org_id: org_id.to_owned(),
            kind: draft.kind,
            priority: draft.priority,
            original_text: draft.original_text.clone(),
            customer_text: draft.customer_text.clone(),
            keywords: draft.keywords.clone(),
            created_by: format!("manager:{created_by}"),
            starts_at: now,
            expires_at: now + Duration::minutes(draft.ttl_minutes),
            expire_on_reopen: draft.expire_on_reopen,
            active: true,
            created_at: now,
        }
    }

    async fn handle_close(
        &self,
        manager: &ManagerNumber,
        original: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<String, EngineError> {
        if !manager.can_update_overrides {
            return Ok(permission_reply(manager, "update the business status"));
        }

        let draft = self.close_draft(original, reason.as_deref());
        let (booking_count, booking_summaries) =
            self.bookings.confirmed_today(&manager.org_id).await?;

        if booking_count > 0 {
            let context = ActionContext {
                booking_count,
                booking_summaries,
                override_request: Some(draft),
            };
            return match self
                .confirmation
                .request_confirmation(
                    &manager.org_id,
                    &manager.id.0,
                    ManagerActionKind::CloseBusiness,
                    original,
                    context,
                    Duration::minutes(self.config.pending_action_ttl_minutes),
                    now,
                )
                .await
            {
                Ok((_, prompt)) => Ok(prompt),
                Err(ConfirmationError::AlreadyPending) => Ok(
                    "You already have a pending confirmation — reply \"yes\" or \"no\" \
                     to that first."
                        .to_owned(),
                ),
                Err(ConfirmationError::Engine(error)) => Err(error),
            };
        }

        let row = Self::draft_to_row(&draft, &manager.org_id, &manager.id.0, now);
        self.overrides
            .create_replacing(row, Some(OverrideKind::Hours))
            .await
            .map_err(persistence)?;
        Ok("Done — customers will now be told you're closed.".to_owned())
    }

    async fn handle_open(
        &self,
        manager: &ManagerNumber,
        now: DateTime<Utc>,
    ) -> Result<String, EngineError> {
        if !manager.can_update_overrides {
            return Ok(permission_reply(manager, "update the business status"));
        }

        let cleared = self.execute_reopen(&manager.org_id, &manager.id.0, now).await?;
        Ok(if cleared > 0 {
            format!("Welcome back — you're open again and {cleared} temporary notice(s) were cleared.")
        } else {
            "Welcome back — customers will now be told you're open as usual.".to_owned()
        })
    }

    /// Deactivate-then-create for the hours row runs in one atomic repository
    /// call; `expire_on_reopen` rows of other kinds are retired afterwards.
    async fn execute_reopen(
        &self,
        org_id: &str,
        manager_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u32, EngineError> {
        let stale: Vec<TemporaryOverride> = self
            .overrides
            .get_active(org_id, None)
            .await
            .map_err(persistence)?
            .into_iter()
            .filter(|row| row.expire_on_reopen && row.kind != OverrideKind::Hours)
            .collect();

        let open_draft = OverrideDraft {
            kind: OverrideKind::Hours,
            priority: OverridePriority::Urgent,
            original_text: "open".to_owned(),
            customer_text: "We are open as usual.".to_owned(),
            keywords: vec!["open".to_owned(), "closed".to_owned(), "hours".to_owned()],
            ttl_minutes: self.config.default_override_ttl_minutes,
            expire_on_reopen: false,
        };
        let row = Self::draft_to_row(&open_draft, org_id, manager_id, now);
        self.overrides
            .create_replacing(row, Some(OverrideKind::Hours))
            .await
            .map_err(persistence)?;

        let mut cleared = 0;
        for row in stale {
            if self.overrides.deactivate(&row.id).await.map_err(persistence)? {
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn create_simple_override(
        &self,
        manager: &ManagerNumber,
        kind: OverrideKind,
        text: String,
        now: DateTime<Utc>,
    ) -> Result<String, EngineError> {
        if !manager.can_update_overrides {
            return Ok(permission_reply(manager, "post customer updates"));
        }

        let (priority, keywords) = match kind {
            OverrideKind::Availability => (
                OverridePriority::High,
                vec![
                    "available".to_owned(),
                    "availability".to_owned(),
                    "book".to_owned(),
                    "booking".to_owned(),
                ],
            ),
            _ => (OverridePriority::Medium, Vec::new()),
        };

        let draft = OverrideDraft {
            kind,
            priority,
            original_text: text.clone(),
            customer_text: text,
            keywords,
            ttl_minutes: self.config.default_override_ttl_minutes,
            expire_on_reopen: true,
        };
        let row = Self::draft_to_row(&draft, &manager.org_id, &manager.id.0, now);
        let expires = row.expires_at;
        self.overrides.create(row).await.map_err(persistence)?;

        Ok(format!(
            "Noted — customers will hear about this until {}.",
            expires.format("%H:%M")
        ))
    }

    async fn handle_status(
        &self,
        manager: &ManagerNumber,
        now: DateTime<Utc>,
    ) -> Result<String, EngineError> {
        let active: Vec<TemporaryOverride> = self
            .overrides
            .get_active(&manager.org_id, None)
            .await
            .map_err(persistence)?
            .into_iter()
            .filter(|row| row.is_effective(now))
            .collect();

        if active.is_empty() {
            return Ok("No temporary updates are active right now.".to_owned());
        }

        let mut reply = String::from("Active updates:");
        for row in &active {
            reply.push_str(&format!(
                "\n- [{}/{}] {} (until {})",
                row.kind.as_str(),
                row.priority.as_str(),
                row.customer_text,
                row.expires_at.format("%H:%M"),
            ));
        }
        Ok(reply)
    }

    async fn execute_confirmed(
        &self,
        manager: &ManagerNumber,
        action: PendingManagerAction,
        now: DateTime<Utc>,
    ) -> Result<String, EngineError> {
        match action.kind {
            ManagerActionKind::CloseBusiness => {
                let draft = action
                    .context
                    .override_request
                    .unwrap_or_else(|| self.close_draft(&action.original_message, None));
                let row = Self::draft_to_row(&draft, &manager.org_id, &manager.id.0, now);
                self.overrides
                    .create_replacing(row, Some(OverrideKind::Hours))
                    .await
                    .map_err(persistence)?;
                Ok("Done — customers will now be told you're closed. Please remember to \
                    contact the affected bookings."
                    .to_owned())
            }
            ManagerActionKind::ReopenBusiness => {
                self.execute_reopen(&manager.org_id, &manager.id.0, now).await?;
                Ok("Done — customers will now be told you're open as usual.".to_owned())
            }
            ManagerActionKind::DeactivateOverride => {
                let kind = action
                    .context
                    .override_request
                    .map(|draft| draft.kind)
                    .unwrap_or(OverrideKind::General);
                let cleared =
                    self.overrides.deactivate_kind(&manager.org_id, kind).await.map_err(persistence)?;
                Ok(format!("Done — {cleared} update(s) removed."))
            }
        }
    }
}

fn permission_reply(manager: &ManagerNumber, action: &str) -> String {
    tracing::warn!(
        event_name = "manager_permission_denied",
        manager_id = %manager.id.0,
        action,
    );
    format!("Sorry {}, your number isn't authorized to {action}.", manager.display_name)
}

#[cfg(test)]
mod tests {
    use super::{parse_manager_command, ManagerCommand};

    #[test]
    fn explicit_verbs_parse_directly() {
        assert_eq!(
            parse_manager_command("close boiler broke"),
            ManagerCommand::Close { reason: Some("boiler broke".to_owned()) }
        );
        assert_eq!(parse_manager_command("open"), ManagerCommand::Open);
        assert_eq!(
            parse_manager_command("note happy hour 5-7 today"),
            ManagerCommand::Note { text: "happy hour 5-7 today".to_owned() }
        );
        assert_eq!(
            parse_manager_command("unavailable no tables until 8pm"),
            ManagerCommand::Unavailable { text: "no tables until 8pm".to_owned() }
        );
        assert_eq!(parse_manager_command("status"), ManagerCommand::Status);
    }

    #[test]
    fn natural_phrasing_falls_back_to_close_and_open() {
        assert_eq!(
            parse_manager_command("we're closing early today"),
            ManagerCommand::Close { reason: Some("we're closing early today".to_owned()) }
        );
        assert_eq!(parse_manager_command("we are back open again"), ManagerCommand::Open);
    }

    #[test]
    fn anything_else_is_unknown() {
        assert_eq!(
            parse_manager_command("what's the wifi password"),
            ManagerCommand::Unknown { text: "what's the wifi password".to_owned() }
        );
    }
}
