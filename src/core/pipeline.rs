use crate::core::{
    ConfigProvider, Digest, Message, MessageSource, Notifier, Pipeline, RunSummary, Storage,
};
use crate::utils::error::Result;
use std::time::Duration;

/// Fetches the newest message per channel, keeps the ones not yet recorded,
/// mails them as one digest and then records them.
pub struct WatchPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    source: Box<dyn MessageSource>,
    notifier: Box<dyn Notifier>,
}

impl<S: Storage, C: ConfigProvider> WatchPipeline<S, C> {
    pub fn new(
        storage: S,
        config: C,
        source: Box<dyn MessageSource>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            storage,
            config,
            source,
            notifier,
        }
    }

    async fn is_new(&self, message: &Message) -> Result<bool> {
        let Some(last_line) = self
            .storage
            .read_last_line(&message.state_file_name())
            .await?
        else {
            return Ok(true);
        };

        let last = Message::from_state_line(&last_line)?;
        Ok(last.id != message.id)
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for WatchPipeline<S, C> {
    async fn extract(&self) -> Result<Vec<Message>> {
        let channels = self.config.channels();
        let delay = Duration::from_millis(self.config.request_delay_ms());
        let mut fetched = Vec::with_capacity(channels.len());

        // One request at a time; parallel polling gets the account rate limited.
        for (index, channel) in channels.iter().enumerate() {
            tracing::debug!("📡 Fetching {}/{}: {}", index + 1, channels.len(), channel.name);

            if let Some(message) = self.source.latest_message(channel).await? {
                fetched.push(message);
            }

            if index + 1 < channels.len() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        Ok(fetched)
    }

    async fn transform(&self, fetched: Vec<Message>) -> Result<Digest> {
        let mut new_messages = Vec::new();

        for message in fetched {
            if self.is_new(&message).await? {
                tracing::debug!("New message {} in {}", message.id, message.channel_name);
                new_messages.push(message);
            } else {
                tracing::info!("No new messages in {}", message.channel_name);
            }
        }

        Ok(Digest::new(new_messages))
    }

    async fn load(&self, digest: Digest) -> Result<RunSummary> {
        if digest.is_empty() {
            return Ok(RunSummary::default());
        }

        let subject = digest.subject(self.config.subject_template());
        let body = digest.body(&self.config.timezone());
        self.notifier.send(&subject, &body).await?;

        // Recorded only once the mail went out, so a failed send is retried next run.
        for message in &digest.messages {
            let line = message.to_state_line()?;
            self.storage
                .append_line(&message.state_file_name(), &line)
                .await?;
        }

        Ok(RunSummary {
            new: digest.len(),
            notified: true,
            ..RunSummary::default()
        })
    }
}
