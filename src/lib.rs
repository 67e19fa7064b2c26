pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use crate::adapters::{DiscordClient, LocalStorage, LogNotifier, SmtpMailer};
pub use crate::config::{CliConfig, WatchSettings};
pub use crate::core::{pipeline::WatchPipeline, watch::WatchEngine};
pub use crate::utils::error::{Result, WatchError};
