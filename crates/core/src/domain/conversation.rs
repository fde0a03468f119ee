use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Website,
    Whatsapp,
    Instagram,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::Whatsapp => "whatsapp",
            Self::Instagram => "instagram",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "website" => Some(Self::Website),
            "whatsapp" => Some(Self::Whatsapp),
            "instagram" => Some(Self::Instagram),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    New,
    AutomatedHandling,
    AwaitingCustomer,
    HumanHandoff,
    Resolved,
    Archived,
}

impl ConversationState {
    /// Allowed-successor check. The full transition table lives here and
    /// nowhere else; callers go through `Conversation::transition`.
    pub fn allows(&self, next: ConversationState) -> bool {
        use ConversationState::{
            Archived, AutomatedHandling, AwaitingCustomer, HumanHandoff, New, Resolved,
        };

        matches!(
            (self, next),
            (New, AutomatedHandling)
                | (New, HumanHandoff)
                | (AutomatedHandling, AwaitingCustomer)
                | (AutomatedHandling, HumanHandoff)
                | (AutomatedHandling, Resolved)
                | (AwaitingCustomer, AutomatedHandling)
                | (AwaitingCustomer, HumanHandoff)
                | (AwaitingCustomer, Archived)
                | (HumanHandoff, AutomatedHandling)
                | (HumanHandoff, Resolved)
                | (Resolved, Archived)
                | (Resolved, AutomatedHandling)
                | (Archived, AutomatedHandling)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::AutomatedHandling => "automated_handling",
            Self::AwaitingCustomer => "awaiting_customer",
            Self::HumanHandoff => "human_handoff",
            Self::Resolved => "resolved",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Self::New),
            "automated_handling" => Some(Self::AutomatedHandling),
            "awaiting_customer" => Some(Self::AwaitingCustomer),
            "human_handoff" => Some(Self::HumanHandoff),
            "resolved" => Some(Self::Resolved),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// One customer thread on one channel. Never hard-deleted; `Archived` is the
/// retirement state and can be reopened by a fresh inbound message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub org_id: String,
    pub channel: Channel,
    pub external_id: String,
    pub state: ConversationState,
    pub locked_by: Option<String>,
    pub last_activity_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn open(
        org_id: impl Into<String>,
        channel: Channel,
        external_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConversationId::generate(),
            org_id: org_id.into(),
            channel,
            external_id: external_id.into(),
            state: ConversationState::New,
            locked_by: None,
            last_activity_at: now,
            metadata: BTreeMap::new(),
            created_at: now,
        }
    }

    /// Applies `next` if the transition table allows it. Returns false and
    /// leaves the state untouched otherwise; callers must check the result.
    pub fn transition(&mut self, next: ConversationState) -> bool {
        if !self.state.allows(next) {
            return false;
        }
        self.state = next;
        true
    }

    pub fn is_open(&self) -> bool {
        self.state != ConversationState::Archived
    }

    pub fn is_locked(&self) -> bool {
        self.locked_by.is_some()
    }

    /// Forces the conversation into human handoff and records the locking
    /// identity, regardless of the current state.
    pub fn lock(&mut self, agent: impl Into<String>) {
        self.state = ConversationState::HumanHandoff;
        self.locked_by = Some(agent.into());
    }

    /// Clears the lock and returns to automated handling. Only the locking
    /// agent or an organization owner may unlock.
    pub fn unlock(&mut self, actor: &str, is_org_owner: bool) -> Result<(), DomainError> {
        let Some(locker) = self.locked_by.as_deref() else {
            return Err(DomainError::InvariantViolation(
                "conversation is not locked".to_owned(),
            ));
        };

        if locker != actor && !is_org_owner {
            return Err(DomainError::PermissionDenied(format!(
                "conversation is locked by {locker}"
            )));
        }

        self.locked_by = None;
        self.state = ConversationState::AutomatedHandling;
        Ok(())
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }
}
