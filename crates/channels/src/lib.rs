pub mod inbound;
pub mod sender;
pub mod templates;

pub use inbound::InboundDelivery;
pub use sender::{
    send_with_retry, ChannelSender, FlakySender, RecordingSender, SendError, SentMessage,
};
