use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    ApiStatus { status: u16, body: String },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Mail transport error: {0}")]
    MailTransportError(#[from] lettre::transport::smtp::Error),

    #[error("Mail build error: {0}")]
    MailBuildError(#[from] lettre::error::Error),

    #[error("Invalid mail address: {0}")]
    MailAddressError(#[from] lettre::address::AddressError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Unreadable state record: {message}")]
    StateRecordError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Storage,
    Notification,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl WatchError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WatchError::ApiError(_) | WatchError::ApiStatus { .. } => ErrorCategory::Network,
            WatchError::TomlError(_)
            | WatchError::ConfigError { .. }
            | WatchError::InvalidConfigValueError { .. }
            | WatchError::MissingConfigError { .. }
            | WatchError::MailAddressError(_) => ErrorCategory::Configuration,
            WatchError::IoError(_) | WatchError::CsvError(_) | WatchError::StateRecordError { .. } => {
                ErrorCategory::Storage
            }
            WatchError::MailTransportError(_) | WatchError::MailBuildError(_) => {
                ErrorCategory::Notification
            }
            WatchError::SerializationError(_) => ErrorCategory::Data,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // transient: the next run may succeed
            WatchError::ApiError(_) | WatchError::MailTransportError(_) => ErrorSeverity::Medium,
            WatchError::ApiStatus { .. }
            | WatchError::SerializationError(_)
            | WatchError::MailBuildError(_)
            | WatchError::StateRecordError { .. }
            | WatchError::CsvError(_) => ErrorSeverity::High,
            WatchError::IoError(_)
            | WatchError::TomlError(_)
            | WatchError::ConfigError { .. }
            | WatchError::InvalidConfigValueError { .. }
            | WatchError::MissingConfigError { .. }
            | WatchError::MailAddressError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            WatchError::ApiError(_) => "Check network connectivity and BASE_URL".to_string(),
            WatchError::ApiStatus { status: 401, .. } | WatchError::ApiStatus { status: 403, .. } => {
                "Check that TOKEN is valid and has access to the watched channels".to_string()
            }
            WatchError::ApiStatus { status: 404, .. } => {
                "Check the channel ids in WATCHED_CHANNEL_* / --channel".to_string()
            }
            WatchError::ApiStatus { status: 429, .. } => {
                "Rate limited; raise --request-delay-ms or --interval-secs".to_string()
            }
            WatchError::ApiStatus { .. } => "Retry later; the API may be unavailable".to_string(),
            WatchError::CsvError(_) | WatchError::StateRecordError { .. } => {
                "Inspect or remove the affected last_messages_*.csv state file".to_string()
            }
            WatchError::IoError(_) => "Check that STATE_DIR exists and is writable".to_string(),
            WatchError::SerializationError(_) => {
                "The API response format was not recognised; check BASE_URL".to_string()
            }
            WatchError::TomlError(_) => "Fix the syntax of the --config file".to_string(),
            WatchError::MailTransportError(_) => {
                "Check SMTP_SERVER, SMTP_PORT, credentials and --smtp-tls".to_string()
            }
            WatchError::MailBuildError(_) | WatchError::MailAddressError(_) => {
                "Check SMTP_ACCOUNT and SMTP_DEST are valid email addresses".to_string()
            }
            WatchError::ConfigError { .. }
            | WatchError::InvalidConfigValueError { .. }
            | WatchError::MissingConfigError { .. } => {
                "Review the environment, .env file and command-line flags".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            WatchError::ApiStatus { status, .. } => {
                format!("The chat API rejected the request (HTTP {})", status)
            }
            WatchError::MissingConfigError { field } => {
                format!("Missing setting: {}", field)
            }
            WatchError::InvalidConfigValueError { field, reason, .. } => {
                format!("Invalid setting {}: {}", field, reason)
            }
            WatchError::MailTransportError(_) => "Could not send the digest email".to_string(),
            other => other.to_string(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_status_severity() {
        let server_error = WatchError::ApiStatus {
            status: 503,
            body: String::new(),
        };
        assert_eq!(server_error.severity(), ErrorSeverity::High);
        assert_eq!(server_error.exit_code(), 1);

        let rate_limited = WatchError::ApiStatus {
            status: 429,
            body: String::new(),
        };
        assert_eq!(rate_limited.exit_code(), 1);
        assert!(rate_limited.recovery_suggestion().contains("--request-delay-ms"));

        let unauthorized = WatchError::ApiStatus {
            status: 401,
            body: "401: Unauthorized".to_string(),
        };
        assert_eq!(unauthorized.severity(), ErrorSeverity::High);
        assert_eq!(unauthorized.exit_code(), 1);
        assert_eq!(unauthorized.category(), ErrorCategory::Network);
        assert!(unauthorized.recovery_suggestion().contains("TOKEN"));
    }

    #[test]
    fn test_config_errors_are_critical() {
        let err = WatchError::MissingConfigError {
            field: "TOKEN".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.user_friendly_message(), "Missing setting: TOKEN");
    }
}
