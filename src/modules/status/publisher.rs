use crate::modules::status::embed::StatusPayload;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("message or channel not found")]
    NotFound,
    #[error("publish failed: {0}")]
    Other(String),
}

/// Channel I/O seam for the reconciliation loop; the real implementation
/// wraps the Discord HTTP client, tests substitute an in-memory fake.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn channel_exists(&self, channel_id: u64) -> bool;
    async fn create_message(
        &self,
        channel_id: u64,
        payload: &StatusPayload,
    ) -> Result<u64, PublishError>;
    async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        payload: &StatusPayload,
    ) -> Result<(), PublishError>;
}

pub struct HttpPublisher {
    http: Arc<serenity::Http>,
    timeout: Duration,
}

impl HttpPublisher {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self {
            http,
            timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl StatusPublisher for HttpPublisher {
    async fn channel_exists(&self, channel_id: u64) -> bool {
        let channel = serenity::ChannelId::new(channel_id);
        matches!(
            timeout(self.timeout, self.http.get_channel(channel)).await,
            Ok(Ok(_))
        )
    }

    async fn create_message(
        &self,
        channel_id: u64,
        payload: &StatusPayload,
    ) -> Result<u64, PublishError> {
        let channel = serenity::ChannelId::new(channel_id);
        let builder = serenity::CreateMessage::new().embed(payload.to_embed());
        match timeout(self.timeout, channel.send_message(&self.http, builder)).await {
            Ok(Ok(message)) => Ok(message.id.get()),
            Ok(Err(e)) => Err(map_discord_error(e)),
            Err(_) => Err(PublishError::Other("send timed out".into())),
        }
    }

    async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        payload: &StatusPayload,
    ) -> Result<(), PublishError> {
        let channel = serenity::ChannelId::new(channel_id);
        let builder = serenity::EditMessage::new().embed(payload.to_embed());
        match timeout(
            self.timeout,
            channel.edit_message(&self.http, serenity::MessageId::new(message_id), builder),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(map_discord_error(e)),
            Err(_) => Err(PublishError::Other("edit timed out".into())),
        }
    }
}

// Discord JSON error codes for deleted targets.
const UNKNOWN_CHANNEL: isize = 10003;
const UNKNOWN_MESSAGE: isize = 10008;

fn map_discord_error(e: serenity::Error) -> PublishError {
    match &e {
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response))
            if response.error.code == UNKNOWN_MESSAGE
                || response.error.code == UNKNOWN_CHANNEL =>
        {
            PublishError::NotFound
        }
        _ => PublishError::Other(e.to_string()),
    }
}
