use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagerId(pub String);

impl ManagerId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Identity binding a phone number to a manager, used for both authorization
/// and nearest-manager selection during escalation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManagerNumber {
    pub id: ManagerId,
    pub org_id: String,
    pub phone: String,
    pub display_name: String,
    pub can_update_overrides: bool,
    pub can_answer_queries: bool,
    pub can_view_bookings: bool,
    pub location_id: Option<String>,
    pub last_active_at: DateTime<Utc>,
}

impl ManagerNumber {
    /// Last-10-digit comparison tolerates country-code formatting variance
    /// ("+44 7900 000001" vs "07900000001").
    pub fn matches_phone(&self, candidate: &str) -> bool {
        let own = phone_tail(&self.phone);
        let other = phone_tail(candidate);
        !own.is_empty() && own == other
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_active_at = now;
    }
}

/// Digits only, truncated to the last 10.
pub fn phone_tail(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    let start = digits.len().saturating_sub(10);
    digits[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{phone_tail, ManagerId, ManagerNumber};

    fn manager(phone: &str) -> ManagerNumber {
        ManagerNumber {
            id: ManagerId("mgr-1".to_owned()),
            org_id: "org-1".to_owned(),
            phone: phone.to_owned(),
            display_name: "Dana".to_owned(),
            can_update_overrides: true,
            can_answer_queries: true,
            can_view_bookings: true,
            location_id: None,
            last_active_at: Utc::now(),
        }
    }

    #[test]
    fn tail_strips_formatting_and_country_code() {
        assert_eq!(phone_tail("+44 7900 000001"), "7900000001");
        assert_eq!(phone_tail("(07900) 000-001"), "7900000001");
        assert_eq!(phone_tail("12345"), "12345");
    }

    #[test]
    fn phone_match_tolerates_country_code_variance() {
        let dana = manager("+447900000001");
        assert!(dana.matches_phone("07900 000001"));
        assert!(dana.matches_phone("447900000001"));
        assert!(!dana.matches_phone("+447900000002"));
    }

    #[test]
    fn empty_numbers_never_match() {
        let blank = manager("");
        assert!(!blank.matches_phone(""));
        assert!(!blank.matches_phone("+447900000001"));
    }
}
