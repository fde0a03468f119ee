use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use frontdesk_core::domain::conversation::Channel;

/// Channel-neutral inbound message, produced by whichever webhook adapter
/// received it. The router is the only consumer; nothing downstream ever
/// parses channel-specific payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundDelivery {
    pub channel: Channel,
    pub external_thread_id: String,
    /// Channel-native message id, when the channel provides one. Used for
    /// replay de-duplication; website widget messages usually lack it.
    pub external_message_id: Option<String>,
    pub sender_display_name: String,
    /// Present on phone-backed channels. Manager identity resolution only
    /// looks at this field.
    pub sender_phone: Option<String>,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl InboundDelivery {
    pub fn new(
        channel: Channel,
        external_thread_id: impl Into<String>,
        sender_display_name: impl Into<String>,
        text: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            channel,
            external_thread_id: external_thread_id.into(),
            external_message_id: None,
            sender_display_name: sender_display_name.into(),
            sender_phone: None,
            text: text.into(),
            received_at,
        }
    }

    pub fn with_message_id(mut self, external_message_id: impl Into<String>) -> Self {
        self.external_message_id = Some(external_message_id.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.sender_phone = Some(phone.into());
        self
    }
}
