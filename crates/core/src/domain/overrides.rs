use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverrideId(pub String);

impl OverrideId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKind {
    Hours,
    Availability,
    General,
}

impl OverrideKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hours => "hours",
            Self::Availability => "availability",
            Self::General => "general",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "hours" => Some(Self::Hours),
            "availability" => Some(Self::Availability),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

/// Ordering matters: resolution picks the highest priority first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverridePriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl OverridePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// A manager-supplied fact that supersedes standing knowledge for a bounded
/// time window. Multiple rows may coexist; resolution yields at most one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemporaryOverride {
    pub id: OverrideId,
    pub org_id: String,
    pub kind: OverrideKind,
    pub priority: OverridePriority,
    pub original_text: String,
    pub customer_text: String,
    pub keywords: Vec<String>,
    pub created_by: String,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub expire_on_reopen: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl TemporaryOverride {
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.active && self.starts_at <= now && now < self.expires_at
    }

    /// True when any trigger keyword appears in the customer text.
    pub fn triggered_by(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.keywords.iter().any(|keyword| lowered.contains(&keyword.to_lowercase()))
    }
}

/// The single effective override: active, inside its window, highest priority
/// first, most recent creation breaking priority ties. Computed fresh on
/// every call; rows can be deactivated mid-conversation.
pub fn resolve_effective(
    rows: &[TemporaryOverride],
    now: DateTime<Utc>,
) -> Option<&TemporaryOverride> {
    rows.iter()
        .filter(|row| row.is_effective(now))
        .max_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)))
}
