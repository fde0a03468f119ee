use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use frontdesk_channels::inbound::InboundDelivery;
use frontdesk_channels::sender::{send_with_retry, ChannelSender};
use frontdesk_channels::templates;
use frontdesk_core::config::EngineConfig;
use frontdesk_core::domain::conversation::{Channel, Conversation, ConversationState};
use frontdesk_core::domain::message::{Message, SenderRole};
use frontdesk_core::errors::EngineError;
use frontdesk_db::repositories::{
    ConversationRepository, ManagerRepository, MessageRepository, OverrideRepository,
    RepositoryError,
};

use crate::commands::ManagerCommandProcessor;
use crate::escalation::{EscalationCheck, EscalationCoordinator};
use crate::persistence;
use crate::responder::{ResponderAdapter, ResponderDecision};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouterOutcome {
    /// Replayed delivery; nothing was stored and nothing was sent.
    Duplicate,
    ManagerHandled { reply: String },
    /// A human owns the conversation; the message was stored for them.
    HumanOwned,
    /// An escalation is still waiting on a manager; no automated answer.
    Waiting,
    Replied { text: String },
}

pub struct MessageRouter {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    managers: Arc<dyn ManagerRepository>,
    overrides: Arc<dyn OverrideRepository>,
    commands: Arc<ManagerCommandProcessor>,
    escalation: Arc<EscalationCoordinator>,
    responder: Arc<ResponderAdapter>,
    sender: Arc<dyn ChannelSender>,
    config: EngineConfig,
}

impl MessageRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        managers: Arc<dyn ManagerRepository>,
        overrides: Arc<dyn OverrideRepository>,
        commands: Arc<ManagerCommandProcessor>,
        escalation: Arc<EscalationCoordinator>,
        responder: Arc<ResponderAdapter>,
        sender: Arc<dyn ChannelSender>,
        config: EngineConfig,
    ) -> Self {
        Self {
            conversations,
            messages,
            managers,
            overrides,
            commands,
            escalation,
            responder,
            sender,
            config,
        }
    }

    /// One inbound delivery, end to end: dedup, manager routing, conversation
    /// resolution, precedence checks, then the responder.
    pub async fn handle_delivery(
        &self,
        org_id: &str,
        delivery: InboundDelivery,
    ) -> Result<RouterOutcome, EngineError> {
        let now = delivery.received_at;

        if let Some(external_id) = delivery.external_message_id.as_deref() {
            let seen = self
                .messages
                .find_by_channel_message_id(delivery.channel, external_id)
                .await
                .map_err(persistence)?;
            if seen.is_some() {
                tracing::debug!(
                    event_name = "delivery_replayed",
                    channel = delivery.channel.as_str(),
                    external_id,
                );
                return Ok(RouterOutcome::Duplicate);
            }
        }

        if let Some(phone) = delivery.sender_phone.as_deref() {
            if let Some(manager) =
                self.managers.resolve_by_phone(org_id, phone).await.map_err(persistence)?
            {
                return self.handle_manager_message(&manager, &delivery, now).await;
            }
        }

        let mut conversation = match self
            .conversations
            .find_open(org_id, delivery.channel, &delivery.external_thread_id)
            .await
            .map_err(persistence)?
        {
            Some(existing) => existing,
            None => Conversation::open(
                org_id,
                delivery.channel,
                delivery.external_thread_id.clone(),
                now,
            ),
        };

        let inbound = Message::inbound(
            conversation.id.clone(),
            delivery.text.clone(),
            delivery.external_message_id.clone(),
            now,
        );
        conversation.touch(now);
        self.conversations.save(conversation.clone()).await.map_err(persistence)?;
        if self.store_inbound(delivery.channel, inbound).await? {
            return Ok(RouterOutcome::Duplicate);
        }

        if conversation.is_locked() || conversation.state == ConversationState::HumanHandoff {
            return Ok(RouterOutcome::HumanOwned);
        }

        match self.escalation.check_pending(&conversation.id, now).await? {
            EscalationCheck::Answered(text) => {
                let text = self
                    .deliver(&mut conversation, &delivery, SenderRole::Human, &text, None)
                    .await?;
                Ok(RouterOutcome::Replied { text })
            }
            EscalationCheck::ExpiredFallback(text) => {
                let text = self
                    .deliver(&mut conversation, &delivery, SenderRole::System, &text, None)
                    .await?;
                Ok(RouterOutcome::Replied { text })
            }
            EscalationCheck::StillWaiting => Ok(RouterOutcome::Waiting),
            EscalationCheck::Clear => self.respond(org_id, conversation, delivery, now).await,
        }
    }

    /// True when the save lost a race against a concurrent replay of the
    /// same `(channel, channel_message_id)`.
    async fn store_inbound(&self, channel: Channel, message: Message) -> Result<bool, EngineError> {
        match self.messages.save(channel, message).await {
            Ok(()) => Ok(false),
            Err(RepositoryError::Conflict(_)) => Ok(true),
            Err(RepositoryError::Database(error))
                if error.as_database_error().is_some_and(|e| e.is_unique_violation()) =>
            {
                Ok(true)
            }
            Err(error) => Err(persistence(error)),
        }
    }

    async fn handle_manager_message(
        &self,
        manager: &frontdesk_core::domain::manager::ManagerNumber,
        delivery: &InboundDelivery,
        now: DateTime<Utc>,
    ) -> Result<RouterOutcome, EngineError> {
        // The manager's own thread is a conversation too; recording the
        // inbound message here arms the replay guard before the command can
        // run a second time.
        let mut thread = match self
            .conversations
            .find_open(&manager.org_id, delivery.channel, &delivery.external_thread_id)
            .await
            .map_err(persistence)?
        {
            Some(existing) => existing,
            None => Conversation::open(
                &manager.org_id,
                delivery.channel,
                delivery.external_thread_id.clone(),
                now,
            ),
        };
        thread.touch(now);
        self.conversations.save(thread.clone()).await.map_err(persistence)?;

        let inbound = Message::inbound(
            thread.id.clone(),
            delivery.text.clone(),
            delivery.external_message_id.clone(),
            now,
        )
        .with_role(SenderRole::Human);
        if self.store_inbound(delivery.channel, inbound).await? {
            return Ok(RouterOutcome::Duplicate);
        }

        self.managers.touch_activity(&manager.id, now).await.map_err(persistence)?;

        let reply = self.commands.handle(manager, &delivery.text, now).await?;

        // State changes are already committed; a lost manager ack is logged,
        // not rolled back.
        if let Err(error) = send_with_retry(
            self.sender.as_ref(),
            delivery.channel,
            &delivery.external_thread_id,
            &reply,
        )
        .await
        {
            tracing::warn!(
                event_name = "manager_ack_delivery_failed",
                manager_id = %manager.id.0,
                error = %error,
            );
        }

        Ok(RouterOutcome::ManagerHandled { reply })
    }

    async fn respond(
        &self,
        org_id: &str,
        mut conversation: Conversation,
        delivery: InboundDelivery,
        now: DateTime<Utc>,
    ) -> Result<RouterOutcome, EngineError> {
        conversation.transition(ConversationState::AutomatedHandling);

        let active = self.overrides.get_active(org_id, None).await.map_err(persistence)?;
        let history: Vec<(SenderRole, String)> = self
            .messages
            .list_for_conversation(&conversation.id, 10)
            .await
            .map_err(persistence)?
            .into_iter()
            .map(|m| (m.role, m.content))
            .collect();

        let outcome = match self.responder.answer(&active, &history, &delivery.text, now).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(
                    event_name = "inference_failed",
                    conversation_id = %conversation.id.0,
                    error = %error,
                );
                let contact = self
                    .managers
                    .most_recently_active(org_id)
                    .await
                    .map_err(persistence)?;
                let text = templates::delivery_fallback(
                    contact.as_ref().map(|m| (m.display_name.as_str(), m.phone.as_str())),
                );
                let text = self
                    .deliver(&mut conversation, &delivery, SenderRole::System, &text, None)
                    .await?;
                return Ok(RouterOutcome::Replied { text });
            }
        };

        let (text, role) = match &outcome.decision {
            ResponderDecision::Answer => (outcome.content.clone(), SenderRole::Automated),
            ResponderDecision::Redirect => (templates::off_topic_redirect(), SenderRole::Automated),
            ResponderDecision::Escalate { reason } => {
                tracing::info!(
                    event_name = "confidence_escalation",
                    conversation_id = %conversation.id.0,
                    reason,
                );
                let opened = self
                    .escalation
                    .escalate(
                        org_id,
                        &conversation,
                        &delivery.sender_display_name,
                        &delivery.text,
                        Duration::minutes(self.config.escalation_wait_minutes),
                        now,
                    )
                    .await?;
                // Without a reachable manager there is no wait promise.
                let text = if opened.is_some() {
                    format!("{}\n\n{}", outcome.content, templates::escalation_wait_notice())
                } else {
                    outcome.content.clone()
                };
                (text, SenderRole::Automated)
            }
        };

        let tags = Some((outcome.confidence, outcome.intent.clone()));
        let text = self.deliver(&mut conversation, &delivery, role, &text, tags).await?;
        Ok(RouterOutcome::Replied { text })
    }

    /// Sends one outbound message, records it, and settles the conversation
    /// into awaiting-customer. When the channel rejects the message twice,
    /// the reply degrades to the handoff fallback (with a manager's direct
    /// contact when one is known) and that is what gets recorded. A channel
    /// that also rejects the fallback is a delivery error.
    async fn deliver(
        &self,
        conversation: &mut Conversation,
        delivery: &InboundDelivery,
        role: SenderRole,
        text: &str,
        tags: Option<(f32, Option<String>)>,
    ) -> Result<String, EngineError> {
        let mut text = text.to_owned();
        let mut role = role;
        let mut tags = tags;

        if let Err(error) = send_with_retry(
            self.sender.as_ref(),
            delivery.channel,
            &delivery.external_thread_id,
            &text,
        )
        .await
        {
            tracing::error!(
                event_name = "outbound_delivery_failed",
                conversation_id = %conversation.id.0,
                channel = delivery.channel.as_str(),
                error = %error,
            );
            let contact = self
                .managers
                .most_recently_active(&conversation.org_id)
                .await
                .map_err(persistence)?;
            text = templates::delivery_fallback(
                contact.as_ref().map(|m| (m.display_name.as_str(), m.phone.as_str())),
            );
            role = SenderRole::System;
            tags = None;

            // Last attempt; when even the fallback cannot be sent, nothing
            // reached the customer and the transport failure surfaces to the
            // caller so the webhook can be retried.
            if let Err(error) =
                self.sender.send(delivery.channel, &delivery.external_thread_id, &text).await
            {
                tracing::warn!(
                    event_name = "fallback_delivery_failed",
                    conversation_id = %conversation.id.0,
                    error = %error,
                );
                return Err(EngineError::Delivery(error.to_string()));
            }
        }

        let mut outbound =
            Message::outbound(conversation.id.clone(), role, text.as_str(), Utc::now());
        if let Some((confidence, intent)) = tags {
            outbound = outbound.with_confidence(confidence, intent);
        }
        self.messages.save(delivery.channel, outbound).await.map_err(persistence)?;

        conversation.transition(ConversationState::AutomatedHandling);
        conversation.transition(ConversationState::AwaitingCustomer);
        self.conversations.save(conversation.clone()).await.map_err(persistence)?;
        Ok(text)
    }
}
