// Application layer: wires resolved settings to concrete adapters.

use crate::adapters::{DiscordClient, LocalStorage, LogNotifier, SmtpMailer};
use crate::config::WatchSettings;
use crate::core::pipeline::WatchPipeline;
use crate::core::Notifier;
use crate::utils::error::{Result, WatchError};

pub type DefaultPipeline = WatchPipeline<LocalStorage, WatchSettings>;

pub fn build_notifier(settings: &WatchSettings) -> Result<Box<dyn Notifier>> {
    if settings.dry_run {
        return Ok(Box::new(LogNotifier));
    }

    let smtp = settings
        .smtp
        .clone()
        .ok_or_else(|| WatchError::MissingConfigError {
            field: "SMTP settings".to_string(),
        })?;
    Ok(Box::new(SmtpMailer::new(smtp)?))
}

pub fn build_pipeline(settings: WatchSettings) -> Result<DefaultPipeline> {
    let storage = LocalStorage::new(settings.state_dir.clone());
    let source = DiscordClient::new(
        &settings.base_url,
        &settings.token,
        &settings.user_agent,
        settings.fetch_limit,
    );
    let notifier = build_notifier(&settings)?;

    Ok(WatchPipeline::new(storage, settings, Box::new(source), notifier))
}
