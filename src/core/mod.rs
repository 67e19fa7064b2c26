pub mod pipeline;
pub mod watch;

pub use crate::domain::model::{Channel, Digest, Message, RunSummary};
pub use crate::domain::ports::{ConfigProvider, MessageSource, Notifier, Pipeline, Storage};
pub use crate::utils::error::Result;
