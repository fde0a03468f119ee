pub mod config;
pub mod domain;
pub mod errors;
pub mod phrases;

pub use domain::conversation::{Channel, Conversation, ConversationId, ConversationState};
pub use domain::manager::{phone_tail, ManagerId, ManagerNumber};
pub use domain::message::{Message, MessageId, SenderRole};
pub use domain::overrides::{
    resolve_effective, OverrideId, OverrideKind, OverridePriority, TemporaryOverride,
};
pub use domain::pending::{
    ActionContext, ManagerActionKind, OverrideDraft, PendingActionId, PendingActionStatus,
    PendingManagerAction,
};
pub use domain::query::{ManagerQuery, ManagerQueryId, ManagerQueryStatus};
pub use errors::{DomainError, EngineError};
pub use phrases::{PhraseVocabulary, ReplyIntent, TopicFilter};
