pub mod conversation;
pub mod manager;
pub mod message;
pub mod overrides;
pub mod pending;
pub mod query;
