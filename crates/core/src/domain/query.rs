use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagerQueryId(pub String);

impl ManagerQueryId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerQueryStatus {
    Pending,
    Answered,
    Expired,
    Cancelled,
}

impl ManagerQueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Answered => "answered",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "answered" => Some(Self::Answered),
            "expired" => Some(Self::Expired),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// An escalated customer question awaiting a manager's answer. A conversation
/// accumulates historical queries but at most one unexpired pending query
/// drives customer-facing wait behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManagerQuery {
    pub id: ManagerQueryId,
    pub org_id: String,
    pub conversation_id: ConversationId,
    pub manager_id: String,
    pub customer_text: String,
    pub status: ManagerQueryStatus,
    pub manager_response: Option<String>,
    pub customer_response: Option<String>,
    pub response_sent: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
}

impl ManagerQuery {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ManagerQueryStatus::Pending && now >= self.expires_at
    }

    pub fn has_unsent_answer(&self) -> bool {
        self.status == ManagerQueryStatus::Answered
            && self.customer_response.is_some()
            && !self.response_sent
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{ManagerQuery, ManagerQueryId, ManagerQueryStatus};
    use crate::domain::conversation::ConversationId;

    fn query(status: ManagerQueryStatus) -> ManagerQuery {
        let now = Utc::now();
        ManagerQuery {
            id: ManagerQueryId("q-1".to_owned()),
            org_id: "org-1".to_owned(),
            conversation_id: ConversationId("c-1".to_owned()),
            manager_id: "mgr-1".to_owned(),
            customer_text: "do you allow dogs?".to_owned(),
            status,
            manager_response: None,
            customer_response: None,
            response_sent: false,
            created_at: now,
            expires_at: now + Duration::minutes(15),
            answered_at: None,
        }
    }

    #[test]
    fn pending_query_expires_after_wait_window() {
        let pending = query(ManagerQueryStatus::Pending);
        assert!(!pending.is_expired(pending.created_at));
        assert!(pending.is_expired(pending.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn answered_query_reports_unsent_answer_only_with_customer_text() {
        let mut answered = query(ManagerQueryStatus::Answered);
        assert!(!answered.has_unsent_answer());

        answered.customer_response = Some("Yes, dogs are welcome.".to_owned());
        assert!(answered.has_unsent_answer());

        answered.response_sent = true;
        assert!(!answered.has_unsent_answer());
    }
}
