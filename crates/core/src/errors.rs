use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("channel delivery failure: {0}")]
    Delivery(String),
    #[error("inference failure: {0}")]
    Inference(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    /// Customer- and manager-safe summary. Detailed causes stay in logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::PermissionDenied(_)) => {
                "You don't have permission for that action."
            }
            Self::Domain(_) => "That request could not be processed. Please check and try again.",
            Self::NotFound(_) => "I couldn't find what that refers to.",
            Self::Delivery(_) | Self::Inference(_) | Self::Persistence(_) => {
                "Something went wrong on our side. A team member will follow up with you."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DomainError, EngineError};

    #[test]
    fn domain_errors_chain_transparently() {
        let error = EngineError::from(DomainError::PermissionDenied(
            "manager lacks can_update_overrides".to_owned(),
        ));
        assert_eq!(error.to_string(), "permission denied: manager lacks can_update_overrides");
        assert_eq!(error.user_message(), "You don't have permission for that action.");
    }

    #[test]
    fn infrastructure_failures_degrade_to_follow_up_message() {
        let error = EngineError::Delivery("whatsapp send timed out".to_owned());
        assert_eq!(
            error.user_message(),
            "Something went wrong on our side. A team member will follow up with you."
        );
    }
}
