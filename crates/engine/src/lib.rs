pub mod commands;
pub mod confirmation;
pub mod escalation;
pub mod language;
pub mod responder;
pub mod router;

pub use commands::{BookingDirectory, ManagerCommand, ManagerCommandProcessor};
pub use confirmation::{ConfirmationError, ConfirmationWorkflow, ReplyOutcome};
pub use escalation::{EscalationCheck, EscalationCoordinator};
pub use language::{detect_language, Language};
pub use responder::{
    InferenceClient, ResponderAdapter, ResponderDecision, ResponderOutcome, ScriptedInferenceClient,
    StructuredAnswer,
};
pub use router::{MessageRouter, RouterOutcome};

use frontdesk_core::errors::EngineError;
use frontdesk_db::repositories::RepositoryError;

pub(crate) fn persistence(error: RepositoryError) -> EngineError {
    EngineError::Persistence(error.to_string())
}
