// Adapters layer: concrete implementations of the domain ports.

pub mod discord;
pub mod mailer;
pub mod storage;

pub use discord::DiscordClient;
pub use mailer::{LogNotifier, SmtpMailer, SmtpSettings, TlsMode};
pub use storage::LocalStorage;
