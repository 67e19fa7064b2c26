use crate::domain::model::{Channel, Message};
use crate::domain::ports::MessageSource;
use crate::utils::error::{Result, WatchError};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://discord.com";
pub const DEFAULT_FETCH_LIMIT: u32 = 50;

/// Message object as returned by `GET /channels/{id}/messages`.
/// Only the fields the watcher stores are decoded.
#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    timestamp: DateTime<FixedOffset>,
    #[serde(default)]
    content: String,
    channel_id: String,
}

pub struct DiscordClient {
    client: Client,
    base_url: String,
    token: String,
    user_agent: String,
    limit: u32,
}

impl DiscordClient {
    pub fn new(base_url: &str, token: &str, user_agent: &str, limit: u32) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            user_agent: user_agent.to_string(),
            limit,
        }
    }

    fn messages_url(&self, channel: &Channel) -> String {
        format!(
            "{}/api/v9/channels/{}/messages?limit={}",
            self.base_url, channel.id, self.limit
        )
    }
}

#[async_trait]
impl MessageSource for DiscordClient {
    async fn latest_message(&self, channel: &Channel) -> Result<Option<Message>> {
        let url = self.messages_url(channel);
        tracing::debug!("Making API request to: {}", url);

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .header(AUTHORIZATION, &self.token)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("API response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                "Request failed with status code: {}. Msg : {}",
                status.as_u16(),
                body
            );
            return Err(WatchError::ApiStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let messages: Vec<ApiMessage> = serde_json::from_slice(&bytes)?;

        // newest first
        let Some(latest) = messages.into_iter().next() else {
            tracing::info!("No messages found in channel {}", channel.name);
            return Ok(None);
        };

        Ok(Some(Message::new(
            latest.id,
            latest.timestamp,
            &latest.content,
            latest.channel_id,
            channel.name.clone(),
        )))
    }
}
