use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::overrides::{OverrideKind, OverridePriority};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingActionId(pub String);

impl PendingActionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingActionStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

impl PendingActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerActionKind {
    CloseBusiness,
    ReopenBusiness,
    DeactivateOverride,
}

impl ManagerActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CloseBusiness => "close_business",
            Self::ReopenBusiness => "reopen_business",
            Self::DeactivateOverride => "deactivate_override",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "close_business" => Some(Self::CloseBusiness),
            "reopen_business" => Some(Self::ReopenBusiness),
            "deactivate_override" => Some(Self::DeactivateOverride),
            _ => None,
        }
    }
}

/// The override that will be created if the manager confirms. Kept as typed
/// fields rather than a loose map so the confirm path never re-parses text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideDraft {
    pub kind: OverrideKind,
    pub priority: OverridePriority,
    pub original_text: String,
    pub customer_text: String,
    pub keywords: Vec<String>,
    pub ttl_minutes: i64,
    pub expire_on_reopen: bool,
}

/// Context snapshot captured when the risky command was detected, surfaced in
/// the confirmation prompt and consumed by the confirm path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContext {
    pub booking_count: u32,
    pub booking_summaries: Vec<String>,
    pub override_request: Option<OverrideDraft>,
}

/// Two-step confirmation gate for destructive manager commands. At most one
/// pending row per manager at a time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingManagerAction {
    pub id: PendingActionId,
    pub org_id: String,
    pub manager_id: String,
    pub kind: ManagerActionKind,
    pub status: PendingActionStatus,
    pub original_message: String,
    pub context: ActionContext,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl PendingManagerAction {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == PendingActionStatus::Pending && now >= self.expires_at
    }

    pub fn is_awaiting_reply(&self, now: DateTime<Utc>) -> bool {
        self.status == PendingActionStatus::Pending && now < self.expires_at
    }
}
