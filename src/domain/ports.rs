use crate::domain::model::{Channel, Digest, Message, RunSummary};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    /// Last non-empty line of `path`, or `None` when the file does not exist yet.
    fn read_last_line(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>>> + Send;
    fn append_line(
        &self,
        path: &str,
        line: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn latest_message(&self, channel: &Channel) -> Result<Option<Message>>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

pub trait ConfigProvider: Send + Sync {
    fn channels(&self) -> &[Channel];
    fn request_delay_ms(&self) -> u64;
    fn subject_template(&self) -> &str;
    fn timezone(&self) -> chrono_tz::Tz;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<Message>>;
    async fn transform(&self, fetched: Vec<Message>) -> Result<Digest>;
    async fn load(&self, digest: Digest) -> Result<RunSummary>;
}
