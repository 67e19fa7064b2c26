use crate::domain::ports::Notifier;
use crate::utils::error::{Result, WatchError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as Email, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_SMTP_PORT: u16 = 465;
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// TLS from the first byte (SMTPS, usually port 465).
    #[default]
    Implicit,
    /// Plain connection upgraded with STARTTLS (usually port 587).
    Starttls,
}

#[derive(Clone)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub account: String,
    pub password: String,
    pub recipient: String,
    pub tls: TlsMode,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("account", &self.account)
            .field("password", &"***")
            .field("recipient", &self.recipient)
            .field("tls", &self.tls)
            .finish()
    }
}

/// The password is stored base64-encoded in the environment.
pub fn decode_password(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| WatchError::InvalidConfigValueError {
            field: "SMTP_PASSWORD".to_string(),
            value: "***".to_string(),
            reason: format!("not valid base64: {}", e),
        })?;

    String::from_utf8(bytes).map_err(|_| WatchError::InvalidConfigValueError {
        field: "SMTP_PASSWORD".to_string(),
        value: "***".to_string(),
        reason: "decoded password is not UTF-8".to_string(),
    })
}

pub struct SmtpMailer {
    settings: SmtpSettings,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Result<Self> {
        let builder = match settings.tls {
            TlsMode::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.server)?,
            TlsMode::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)?
            }
        };

        let transport = builder
            .port(settings.port)
            .credentials(Credentials::new(
                settings.account.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self {
            settings,
            transport,
        })
    }

    pub fn build_email(&self, subject: &str, body: &str) -> Result<Email> {
        build_email(&self.settings, subject, body)
    }
}

fn build_email(settings: &SmtpSettings, subject: &str, body: &str) -> Result<Email> {
    let from: Mailbox = settings.account.parse()?;
    let to: Mailbox = settings.recipient.parse()?;

    let email = Email::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())?;
    Ok(email)
}

#[async_trait]
impl Notifier for SmtpMailer {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let email = self.build_email(subject, body)?;
        tracing::debug!(
            "Connecting to {}:{} ({:?})",
            self.settings.server,
            self.settings.port,
            self.settings.tls
        );
        self.transport.send(email).await?;
        tracing::info!("{} sending by email.", subject);
        Ok(())
    }
}

/// Logs the digest instead of mailing it (`--dry-run`).
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        tracing::info!(subject = %subject, "Dry run, digest not sent");
        for line in body.lines().filter(|l| !l.is_empty()) {
            tracing::info!("{}", line);
        }
        Ok(())
    }
}
