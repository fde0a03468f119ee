use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use frontdesk_core::domain::conversation::Channel;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("channel rejected the message: {0}")]
    Rejected(String),
    #[error("channel unreachable: {0}")]
    Unreachable(String),
}

/// Outbound capability implemented per channel. Returns the channel-native
/// id of the delivered message.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(
        &self,
        channel: Channel,
        external_thread_id: &str,
        text: &str,
    ) -> Result<String, SendError>;
}

/// One retry, then the error surfaces so the caller can take the fallback
/// path (enhanced handoff or a generic apology).
pub async fn send_with_retry(
    sender: &dyn ChannelSender,
    channel: Channel,
    external_thread_id: &str,
    text: &str,
) -> Result<String, SendError> {
    match sender.send(channel, external_thread_id, text).await {
        Ok(id) => Ok(id),
        Err(first) => {
            tracing::warn!(
                event_name = "channel_send_retry",
                channel = channel.as_str(),
                error = %first,
                "first delivery attempt failed, retrying once"
            );
            sender.send(channel, external_thread_id, text).await
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: Channel,
    pub external_thread_id: String,
    pub text: String,
}

/// Test double that records every delivery and hands out sequential ids.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMessage>>,
    counter: AtomicU32,
}

impl RecordingSender {
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    async fn send(
        &self,
        channel: Channel,
        external_thread_id: &str,
        text: &str,
    ) -> Result<String, SendError> {
        self.sent.lock().await.push(SentMessage {
            channel,
            external_thread_id: external_thread_id.to_owned(),
            text: text.to_owned(),
        });
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("out-{n}"))
    }
}

/// Test double that fails the first `failures` attempts, then delivers.
pub struct FlakySender {
    failures: AtomicU32,
    inner: RecordingSender,
}

impl FlakySender {
    pub fn failing_first(failures: u32) -> Self {
        Self { failures: AtomicU32::new(failures), inner: RecordingSender::default() }
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.inner.sent().await
    }
}

#[async_trait]
impl ChannelSender for FlakySender {
    async fn send(
        &self,
        channel: Channel,
        external_thread_id: &str,
        text: &str,
    ) -> Result<String, SendError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SendError::Unreachable("simulated outage".to_owned()));
        }
        self.inner.send(channel, external_thread_id, text).await
    }
}
