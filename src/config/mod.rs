pub mod toml_config;

use crate::adapters::discord::{DEFAULT_BASE_URL, DEFAULT_FETCH_LIMIT};
use crate::adapters::mailer::{decode_password, SmtpSettings, TlsMode, DEFAULT_SMTP_PORT};
use crate::core::ConfigProvider;
use crate::domain::model::{Channel, DEFAULT_SUBJECT_TEMPLATE};
use crate::utils::error::{Result, WatchError};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_range, validate_required_field,
    validate_url, Validate,
};
use chrono_tz::Tz;
use clap::Parser;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use toml_config::TomlConfig;

pub const WATCHED_CHANNEL_PREFIX: &str = "WATCHED_CHANNEL_";
/// Misspelt variable name still found in older `.env` files.
pub const LEGACY_PASSWORD_VAR: &str = "SMTP_PASSWROD";

const DEFAULT_STATE_DIR: &str = ".";
const DEFAULT_REQUEST_DELAY_MS: u64 = 100;
const DEFAULT_TIMEZONE: &str = "Europe/Brussels";
const MAX_FETCH_LIMIT: u32 = 100;

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "chanwatch")]
#[command(about = "Watch chat channels and mail a digest of new messages")]
pub struct CliConfig {
    #[arg(long, help = "TOML settings file; flags and env vars take precedence")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long, env = "TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, env = "USER_AGENT")]
    pub user_agent: Option<String>,

    #[arg(
        long = "channel",
        value_name = "ID-NAME",
        help = "Channel to watch, repeatable; WATCHED_CHANNEL_* env vars are added too"
    )]
    pub channels: Vec<String>,

    #[arg(long, env = "STATE_DIR")]
    pub state_dir: Option<String>,

    #[arg(long, help = "Messages requested per channel (1-100)")]
    pub fetch_limit: Option<u32>,

    #[arg(long, help = "Pause between two channel requests")]
    pub request_delay_ms: Option<u64>,

    #[arg(long, env = "SMTP_SERVER")]
    pub smtp_server: Option<String>,

    #[arg(long, env = "SMTP_PORT")]
    pub smtp_port: Option<u16>,

    #[arg(long, env = "SMTP_ACCOUNT")]
    pub smtp_account: Option<String>,

    #[arg(
        long,
        env = "SMTP_PASSWORD",
        hide_env_values = true,
        help = "base64-encoded SMTP password"
    )]
    pub smtp_password: Option<String>,

    #[arg(long, env = "SMTP_DEST")]
    pub smtp_dest: Option<String>,

    #[arg(long, value_enum)]
    pub smtp_tls: Option<TlsMode>,

    #[arg(long, env = "TIMEZONE", help = "IANA zone used for times in the email")]
    pub timezone: Option<String>,

    #[arg(long, help = "Subject template, {count} is replaced")]
    pub subject: Option<String>,

    #[arg(long, help = "Keep running and poll every N seconds")]
    pub interval_secs: Option<u64>,

    #[arg(long, help = "Log the digest instead of sending it")]
    pub dry_run: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log as JSON lines")]
    pub json_logs: bool,
}

/// Fully resolved settings for one watcher process.
#[derive(Clone)]
pub struct WatchSettings {
    pub base_url: String,
    pub token: String,
    pub user_agent: String,
    pub channels: Vec<Channel>,
    pub state_dir: String,
    pub fetch_limit: u32,
    pub request_delay_ms: u64,
    pub smtp: Option<SmtpSettings>,
    pub timezone: Tz,
    pub subject_template: String,
    pub interval: Option<Duration>,
    pub dry_run: bool,
}

impl fmt::Debug for WatchSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSettings")
            .field("base_url", &self.base_url)
            .field("token", &"***")
            .field("user_agent", &self.user_agent)
            .field("channels", &self.channels)
            .field("state_dir", &self.state_dir)
            .field("fetch_limit", &self.fetch_limit)
            .field("request_delay_ms", &self.request_delay_ms)
            .field("smtp", &self.smtp)
            .field("timezone", &self.timezone)
            .field("subject_template", &self.subject_template)
            .field("interval", &self.interval)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl WatchSettings {
    /// Reads the optional TOML file and the process environment, then validates.
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => {
                tracing::debug!("Loading settings from {}", path.display());
                TomlConfig::from_file(path)?
            }
            None => TomlConfig::default(),
        };
        let env: HashMap<String, String> = std::env::vars().collect();

        let settings = Self::resolve(cli, &file, &env)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Flag or env var first, then the TOML file, then the default.
    pub fn resolve(
        cli: &CliConfig,
        file: &TomlConfig,
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let base_url = cli
            .base_url
            .clone()
            .or_else(|| file.discord.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let token = validate_required_field(
            "TOKEN",
            &cli.token.clone().or_else(|| file.discord.token.clone()),
        )?
        .clone();

        let user_agent = validate_required_field(
            "USER_AGENT",
            &cli.user_agent
                .clone()
                .or_else(|| file.discord.user_agent.clone()),
        )?
        .clone();

        let mut channels = Vec::new();
        for spec in &cli.channels {
            push_unique(&mut channels, spec.parse()?);
        }
        for channel in watched_channels_from_env(env)? {
            push_unique(&mut channels, channel);
        }
        if channels.is_empty() {
            channels = file.channels.clone();
        }

        let timezone_name = cli
            .timezone
            .clone()
            .or_else(|| file.digest.timezone.clone())
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone = parse_timezone(&timezone_name)?;

        let smtp = match resolve_smtp(cli, file, env) {
            Ok(smtp) => Some(smtp),
            Err(e) if cli.dry_run => {
                tracing::debug!("SMTP settings incomplete, fine for a dry run: {}", e);
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            base_url,
            token,
            user_agent,
            channels,
            state_dir: cli
                .state_dir
                .clone()
                .or_else(|| file.state.dir.clone())
                .unwrap_or_else(|| DEFAULT_STATE_DIR.to_string()),
            fetch_limit: cli
                .fetch_limit
                .or(file.discord.fetch_limit)
                .unwrap_or(DEFAULT_FETCH_LIMIT),
            request_delay_ms: cli
                .request_delay_ms
                .or(file.discord.request_delay_ms)
                .unwrap_or(DEFAULT_REQUEST_DELAY_MS),
            smtp,
            timezone,
            subject_template: cli
                .subject
                .clone()
                .or_else(|| file.digest.subject.clone())
                .unwrap_or_else(|| DEFAULT_SUBJECT_TEMPLATE.to_string()),
            interval: cli
                .interval_secs
                .or(file.schedule.interval_secs)
                .map(Duration::from_secs),
            dry_run: cli.dry_run,
        })
    }
}

fn push_unique(channels: &mut Vec<Channel>, channel: Channel) {
    if !channels.iter().any(|c| c.id == channel.id) {
        channels.push(channel);
    }
}

/// `WATCHED_CHANNEL_*` variables, ordered by variable name.
pub fn watched_channels_from_env(env: &HashMap<String, String>) -> Result<Vec<Channel>> {
    let mut watched: Vec<(&String, &String)> = env
        .iter()
        .filter(|(key, _)| key.starts_with(WATCHED_CHANNEL_PREFIX))
        .collect();
    watched.sort();

    watched
        .into_iter()
        .map(|(key, value)| {
            value.parse().map_err(|e| match e {
                WatchError::InvalidConfigValueError { value, reason, .. } => {
                    WatchError::InvalidConfigValueError {
                        field: key.clone(),
                        value,
                        reason,
                    }
                }
                other => other,
            })
        })
        .collect()
}

fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| WatchError::InvalidConfigValueError {
            field: "timezone".to_string(),
            value: name.to_string(),
            reason: e.to_string(),
        })
}

fn resolve_smtp(
    cli: &CliConfig,
    file: &TomlConfig,
    env: &HashMap<String, String>,
) -> Result<SmtpSettings> {
    let server = cli.smtp_server.clone().or_else(|| file.smtp.server.clone());
    let account = cli
        .smtp_account
        .clone()
        .or_else(|| file.smtp.account.clone());
    let password = cli
        .smtp_password
        .clone()
        .or_else(|| env.get(LEGACY_PASSWORD_VAR).cloned())
        .or_else(|| file.smtp.password.clone());
    let recipient = cli.smtp_dest.clone().or_else(|| file.smtp.recipient.clone());

    Ok(SmtpSettings {
        server: validate_required_field("SMTP_SERVER", &server)?.clone(),
        port: cli
            .smtp_port
            .or(file.smtp.port)
            .unwrap_or(DEFAULT_SMTP_PORT),
        account: validate_required_field("SMTP_ACCOUNT", &account)?.clone(),
        password: decode_password(validate_required_field("SMTP_PASSWORD", &password)?)?,
        recipient: validate_required_field("SMTP_DEST", &recipient)?.clone(),
        tls: cli.smtp_tls.or(file.smtp.tls).unwrap_or_default(),
    })
}

impl Validate for WatchSettings {
    fn validate(&self) -> Result<()> {
        validate_url("BASE_URL", &self.base_url)?;
        validate_non_empty_string("TOKEN", &self.token)?;
        validate_non_empty_string("USER_AGENT", &self.user_agent)?;

        if self.channels.is_empty() {
            return Err(WatchError::MissingConfigError {
                field: format!("{}* or --channel", WATCHED_CHANNEL_PREFIX),
            });
        }
        let mut names = HashSet::new();
        for channel in &self.channels {
            channel.check()?;
            // The state file is keyed by name only.
            if !names.insert(channel.name.as_str()) {
                return Err(WatchError::InvalidConfigValueError {
                    field: "channel.name".to_string(),
                    value: channel.name.clone(),
                    reason: format!("another channel already uses {}", channel.state_file_name()),
                });
            }
        }

        validate_path("STATE_DIR", &self.state_dir)?;
        validate_range("fetch_limit", self.fetch_limit, 1, MAX_FETCH_LIMIT)?;

        if let Some(interval) = self.interval {
            validate_range("interval_secs", interval.as_secs(), 1, u64::MAX)?;
        }

        match &self.smtp {
            Some(smtp) => {
                validate_non_empty_string("SMTP_SERVER", &smtp.server)?;
                validate_range("SMTP_PORT", smtp.port, 1, u16::MAX)?;
                validate_non_empty_string("SMTP_ACCOUNT", &smtp.account)?;
                validate_non_empty_string("SMTP_DEST", &smtp.recipient)?;
            }
            None if !self.dry_run => {
                return Err(WatchError::MissingConfigError {
                    field: "SMTP settings".to_string(),
                });
            }
            None => {}
        }

        Ok(())
    }
}

impl ConfigProvider for WatchSettings {
    fn channels(&self) -> &[Channel] {
        &self.channels
    }

    fn request_delay_ms(&self) -> u64 {
        self.request_delay_ms
    }

    fn subject_template(&self) -> &str {
        &self.subject_template
    }

    fn timezone(&self) -> Tz {
        self.timezone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> CliConfig {
        CliConfig {
            token: Some("tok".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
            channels: vec!["1-rust-jobs".to_string()],
            smtp_server: Some("smtp.example.com".to_string()),
            smtp_account: Some("watcher@example.com".to_string()),
            smtp_password: Some("aHVudGVyMg==".to_string()),
            smtp_dest: Some("me@example.com".to_string()),
            ..CliConfig::default()
        }
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = WatchSettings::resolve(&cli(), &TomlConfig::default(), &env(&[])).unwrap();

        assert_eq!(settings.base_url, "https://discord.com");
        assert_eq!(settings.state_dir, ".");
        assert_eq!(settings.fetch_limit, 50);
        assert_eq!(settings.request_delay_ms, 100);
        assert_eq!(settings.timezone, chrono_tz::Europe::Brussels);
        assert_eq!(settings.subject_template, "{count} new jobs found");
        assert!(settings.interval.is_none());

        let smtp = settings.smtp.as_ref().unwrap();
        assert_eq!(smtp.port, 465);
        assert_eq!(smtp.password, "hunter2");
        assert_eq!(smtp.tls, TlsMode::Implicit);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_channels_from_env_sorted_and_merged() {
        let vars = env(&[
            ("WATCHED_CHANNEL_B", "3-go-jobs"),
            ("WATCHED_CHANNEL_A", "2-python"),
            ("WATCHED_CHANNEL_C", "1-rust-jobs"),
            ("UNRELATED", "9-nope"),
        ]);

        let settings = WatchSettings::resolve(&cli(), &TomlConfig::default(), &vars).unwrap();
        let names: Vec<&str> = settings.channels.iter().map(|c| c.name.as_str()).collect();

        // --channel first, duplicates by id dropped
        assert_eq!(names, vec!["rust-jobs", "python", "go-jobs"]);
    }

    #[test]
    fn test_bad_env_channel_names_the_variable() {
        let vars = env(&[("WATCHED_CHANNEL_1", "no-separator-is-fine"), ("WATCHED_CHANNEL_2", "broken")]);

        match watched_channels_from_env(&vars) {
            Err(WatchError::InvalidConfigValueError { field, .. }) => {
                assert_eq!(field, "WATCHED_CHANNEL_2")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_toml_used_when_flags_absent() {
        let file = TomlConfig::from_toml_str(
            r#"
[discord]
token = "file-token"
user_agent = "file-agent"
base_url = "http://localhost:9000"

[[channels]]
id = "7"
name = "from-file"

[smtp]
server = "smtp.file.com"
port = 587
account = "a@file.com"
password = "aHVudGVyMg=="
recipient = "b@file.com"
tls = "starttls"

[schedule]
interval_secs = 60
"#,
        )
        .unwrap();

        let cli = CliConfig {
            token: Some("flag-token".to_string()),
            ..CliConfig::default()
        };
        let settings = WatchSettings::resolve(&cli, &file, &env(&[])).unwrap();

        assert_eq!(settings.token, "flag-token");
        assert_eq!(settings.user_agent, "file-agent");
        assert_eq!(settings.base_url, "http://localhost:9000");
        assert_eq!(settings.channels[0].name, "from-file");
        assert_eq!(settings.interval, Some(Duration::from_secs(60)));

        let smtp = settings.smtp.unwrap();
        assert_eq!(smtp.server, "smtp.file.com");
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.tls, TlsMode::Starttls);
    }

    #[test]
    fn test_legacy_password_variable() {
        let mut cli = cli();
        cli.smtp_password = None;

        let settings = WatchSettings::resolve(
            &cli,
            &TomlConfig::default(),
            &env(&[(LEGACY_PASSWORD_VAR, "aHVudGVyMg==")]),
        )
        .unwrap();
        assert_eq!(settings.smtp.unwrap().password, "hunter2");
    }

    #[test]
    fn test_missing_smtp_is_an_error_unless_dry_run() {
        let mut cli = cli();
        cli.smtp_server = None;

        let err = WatchSettings::resolve(&cli, &TomlConfig::default(), &env(&[])).unwrap_err();
        assert!(matches!(
            err,
            WatchError::MissingConfigError { ref field } if field == "SMTP_SERVER"
        ));

        cli.dry_run = true;
        let settings = WatchSettings::resolve(&cli, &TomlConfig::default(), &env(&[])).unwrap();
        assert!(settings.smtp.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_token() {
        let mut cli = cli();
        cli.token = None;
        assert!(matches!(
            WatchSettings::resolve(&cli, &TomlConfig::default(), &env(&[])),
            Err(WatchError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_validation_failures() {
        let mut no_channels = cli();
        no_channels.channels.clear();
        let settings =
            WatchSettings::resolve(&no_channels, &TomlConfig::default(), &env(&[])).unwrap();
        assert!(matches!(
            settings.validate(),
            Err(WatchError::MissingConfigError { .. })
        ));

        let mut bad_limit = cli();
        bad_limit.fetch_limit = Some(500);
        let settings =
            WatchSettings::resolve(&bad_limit, &TomlConfig::default(), &env(&[])).unwrap();
        assert!(settings.validate().is_err());

        let mut bad_url = cli();
        bad_url.base_url = Some("discord.com".to_string());
        let settings = WatchSettings::resolve(&bad_url, &TomlConfig::default(), &env(&[])).unwrap();
        assert!(settings.validate().is_err());

        let mut bad_zone = cli();
        bad_zone.timezone = Some("Mars/Olympus".to_string());
        assert!(WatchSettings::resolve(&bad_zone, &TomlConfig::default(), &env(&[])).is_err());
    }

    #[test]
    fn test_channels_sharing_a_name_are_rejected() {
        let mut shared = cli();
        shared.channels = vec!["1-jobs".to_string(), "2-jobs".to_string()];
        let settings = WatchSettings::resolve(&shared, &TomlConfig::default(), &env(&[])).unwrap();

        match settings.validate() {
            Err(WatchError::InvalidConfigValueError { field, value, reason }) => {
                assert_eq!(field, "channel.name");
                assert_eq!(value, "jobs");
                assert!(reason.contains("last_messages_jobs.csv"));
            }
            other => panic!("expected a duplicate name error, got {:?}", other),
        }

        let settings = WatchSettings::resolve(
            &cli(),
            &TomlConfig::default(),
            &env(&[("WATCHED_CHANNEL_B", "2-rust-jobs")]),
        )
        .unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let settings = WatchSettings::resolve(&cli(), &TomlConfig::default(), &env(&[])).unwrap();
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("tok\""));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = CliConfig::parse_from([
            "chanwatch",
            "--channel",
            "1-rust-jobs",
            "--channel",
            "2-go-jobs",
            "--smtp-tls",
            "starttls",
            "--dry-run",
            "--interval-secs",
            "300",
        ]);

        assert_eq!(cli.channels.len(), 2);
        assert_eq!(cli.smtp_tls, Some(TlsMode::Starttls));
        assert!(cli.dry_run);
        assert_eq!(cli.interval_secs, Some(300));
    }
}
