use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;

use crate::error::DiscordError;
use crate::types::{Message, MessagePayload, FLAG_EPHEMERAL};

/// Discord epoch (2015-01-01T00:00:00Z) in milliseconds.
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Which message an edit goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTarget {
    /// The placeholder created by a deferred acknowledgment, addressed by the
    /// interaction's completion token.
    Original { application_id: String, token: String },
    /// A persisted channel message, such as a list's anchor.
    Channel { channel_id: String, message_id: String },
}

#[async_trait]
pub trait MessageSurface: Send + Sync {
    async fn edit_message(&self, target: &MessageTarget, message: &MessagePayload) -> Result<(), DiscordError>;

    /// Posts a new channel message and returns its id.
    async fn send_message(&self, channel_id: &str, message: &MessagePayload) -> Result<String, DiscordError>;

    /// Follow-up visible only to the user who triggered the interaction.
    async fn send_ephemeral(&self, application_id: &str, token: &str, content: &str) -> Result<(), DiscordError>;

    /// One page of history, newest first, strictly older than `before` when given.
    async fn channel_messages(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u8,
    ) -> Result<Vec<Message>, DiscordError>;
}

pub struct DiscordClient {
    client: Client,
    base_url: String,
    bot_token: String,
}

#[derive(Deserialize)]
struct CreatedMessage {
    id: String,
}

impl DiscordClient {
    pub fn new(bot_token: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            bot_token,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bot {}", self.bot_token))
    }

    async fn check(response: Response) -> Result<Response, DiscordError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await?;
            return Err(DiscordError::Api { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl MessageSurface for DiscordClient {
    async fn edit_message(&self, target: &MessageTarget, message: &MessagePayload) -> Result<(), DiscordError> {
        let path = match target {
            MessageTarget::Original { application_id, token } => {
                format!("/webhooks/{application_id}/{token}/messages/@original")
            }
            MessageTarget::Channel { channel_id, message_id } => {
                format!("/channels/{channel_id}/messages/{message_id}")
            }
        };

        let response = self.request(Method::PATCH, &path).json(message).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn send_message(&self, channel_id: &str, message: &MessagePayload) -> Result<String, DiscordError> {
        let response = self
            .request(Method::POST, &format!("/channels/{channel_id}/messages"))
            .json(message)
            .send()
            .await?;
        let created: CreatedMessage = Self::check(response).await?.json().await?;
        Ok(created.id)
    }

    async fn send_ephemeral(&self, application_id: &str, token: &str, content: &str) -> Result<(), DiscordError> {
        let message = MessagePayload {
            flags: Some(FLAG_EPHEMERAL),
            ..MessagePayload::text(content)
        };
        let response = self
            .request(Method::POST, &format!("/webhooks/{application_id}/{token}"))
            .json(&message)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn channel_messages(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u8,
    ) -> Result<Vec<Message>, DiscordError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }

        let response = self
            .request(Method::GET, &format!("/channels/{channel_id}/messages"))
            .query(&query)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

/// Creation time encoded in a snowflake id.
pub fn snowflake_timestamp(id: &str) -> Option<DateTime<FixedOffset>> {
    let raw: u64 = id.parse().ok()?;
    let millis = i64::try_from(raw >> 22).ok()? + DISCORD_EPOCH_MS;
    Utc.timestamp_millis_opt(millis).single().map(|t| t.fixed_offset())
}
