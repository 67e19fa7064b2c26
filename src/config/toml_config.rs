use crate::adapters::mailer::TlsMode;
use crate::domain::model::Channel;
use crate::utils::error::{Result, WatchError};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

/// Optional settings file, passed with `--config`.
///
/// ```toml
/// [discord]
/// token = "${TOKEN}"
/// user_agent = "Mozilla/5.0"
///
/// [[channels]]
/// id = "998877"
/// name = "rust-jobs"
///
/// [smtp]
/// server = "smtp.example.com"
/// account = "watcher@example.com"
/// password = "${SMTP_PASSWORD}"
/// recipient = "me@example.com"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub discord: DiscordSection,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub smtp: SmtpSection,
    #[serde(default)]
    pub digest: DigestSection,
    #[serde(default)]
    pub state: StateSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscordSection {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub user_agent: Option<String>,
    pub fetch_limit: Option<u32>,
    pub request_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmtpSection {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub account: Option<String>,
    /// base64, like `SMTP_PASSWORD`
    pub password: Option<String>,
    pub recipient: Option<String>,
    pub tls: Option<TlsMode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DigestSection {
    pub timezone: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateSection {
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleSection {
    pub interval_secs: Option<u64>,
}

impl TomlConfig {
    /// Loads settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(WatchError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = substitute_vars(content, |name| std::env::var(name).ok())?;
        Ok(toml::from_str(&processed_content)?)
    }
}

/// Replaces `${VAR}` placeholders; unknown names are left in place.
pub fn substitute_vars<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| WatchError::ConfigError {
        message: format!("placeholder pattern: {}", e),
    })?;

    let result = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        lookup(var_name).unwrap_or_else(|| format!("${{{}}}", var_name))
    });

    Ok(result.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL: &str = r#"
[discord]
base_url = "http://localhost:9000"
token = "abc"
user_agent = "test-agent"
fetch_limit = 10
request_delay_ms = 0

[[channels]]
id = "1"
name = "rust-jobs"

[[channels]]
id = "2"
name = "go-jobs"

[smtp]
server = "smtp.example.com"
port = 587
account = "watcher@example.com"
password = "aHVudGVyMg=="
recipient = "me@example.com"
tls = "starttls"

[digest]
timezone = "Europe/Paris"
subject = "{count} new posts"

[state]
dir = "./state"

[schedule]
interval_secs = 300
"#;

    #[test]
    fn test_parse_full_config() {
        let config = TomlConfig::from_toml_str(FULL).unwrap();

        assert_eq!(config.discord.base_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.discord.fetch_limit, Some(10));
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[1].name, "go-jobs");
        assert_eq!(config.smtp.port, Some(587));
        assert_eq!(config.smtp.tls, Some(TlsMode::Starttls));
        assert_eq!(config.digest.subject.as_deref(), Some("{count} new posts"));
        assert_eq!(config.state.dir.as_deref(), Some("./state"));
        assert_eq!(config.schedule.interval_secs, Some(300));
    }

    #[test]
    fn test_all_sections_optional() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert!(config.channels.is_empty());
        assert!(config.discord.token.is_none());
        assert!(config.smtp.tls.is_none());
    }

    #[test]
    fn test_substitute_vars() {
        let out = substitute_vars("token = \"${A}\"\nother = \"${MISSING}\"", |name| {
            (name == "A").then(|| "secret".to_string())
        })
        .unwrap();

        assert_eq!(out, "token = \"secret\"\nother = \"${MISSING}\"");
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("CHANWATCH_TEST_TOML_TOKEN", "from-env");

        let config = TomlConfig::from_toml_str(
            r#"
[discord]
token = "${CHANWATCH_TEST_TOML_TOKEN}"
"#,
        )
        .unwrap();
        assert_eq!(config.discord.token.as_deref(), Some("from-env"));

        std::env::remove_var("CHANWATCH_TEST_TOML_TOKEN");
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = TomlConfig::from_toml_str("[discord\ntoken = 1").unwrap_err();
        assert!(matches!(err, WatchError::TomlError(_)));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(FULL.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.discord.token.as_deref(), Some("abc"));
    }
}
