use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Customer,
    Automated,
    Human,
    System,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Automated => "automated",
            Self::Human => "human",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "customer" => Some(Self::Customer),
            "automated" => Some(Self::Automated),
            "human" => Some(Self::Human),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Immutable once created, except for the read flag. `channel_message_id`
/// is the channel-native id used for webhook replay de-duplication.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: SenderRole,
    pub content: String,
    pub channel_message_id: Option<String>,
    pub confidence: Option<f32>,
    pub intent: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn inbound(
        conversation_id: ConversationId,
        content: impl Into<String>,
        channel_message_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            conversation_id,
            role: SenderRole::Customer,
            content: content.into(),
            channel_message_id,
            confidence: None,
            intent: None,
            read: false,
            created_at: now,
        }
    }

    pub fn outbound(
        conversation_id: ConversationId,
        role: SenderRole,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            conversation_id,
            role,
            content: content.into(),
            channel_message_id: None,
            confidence: None,
            intent: None,
            read: false,
            created_at: now,
        }
    }

    pub fn with_confidence(mut self, confidence: f32, intent: Option<String>) -> Self {
        self.confidence = Some(confidence);
        self.intent = intent;
        self
    }

    /// Manager-originated inbound messages are stored as `Human`, not
    /// `Customer`.
    pub fn with_role(mut self, role: SenderRole) -> Self {
        self.role = role;
        self
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Message, SenderRole};
    use crate::domain::conversation::ConversationId;

    #[test]
    fn inbound_message_carries_dedup_key() {
        let message = Message::inbound(
            ConversationId("c-1".to_owned()),
            "are you open?",
            Some("wamid.123".to_owned()),
            Utc::now(),
        );

        assert_eq!(message.role, SenderRole::Customer);
        assert_eq!(message.channel_message_id.as_deref(), Some("wamid.123"));
        assert!(!message.read);

        let from_manager = message.with_role(SenderRole::Human);
        assert_eq!(from_manager.role, SenderRole::Human);
    }

    #[test]
    fn outbound_reply_can_record_confidence_tags() {
        let message = Message::outbound(
            ConversationId("c-1".to_owned()),
            SenderRole::Automated,
            "We open at 9am.",
            Utc::now(),
        )
        .with_confidence(0.92, Some("hours_inquiry".to_owned()));

        assert_eq!(message.confidence, Some(0.92));
        assert_eq!(message.intent.as_deref(), Some("hours_inquiry"));
    }
}
