use crate::utils::error::{Result, WatchError};
use crate::utils::validation::{validate_file_component, validate_non_empty_string};
use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const STATE_TIMESTAMP_FORMAT: &str = "%d-%m-%YT%H:%M:%S%.6f%z";
const STATE_TIMESTAMP_PARSE_FORMAT: &str = "%d-%m-%YT%H:%M:%S%.f%z";
const MAIL_TIMESTAMP_FORMAT: &str = "%d/%m/%Y, %H:%M:%S";
const STATE_FIELDS: usize = 5;

pub const DEFAULT_SUBJECT_TEMPLATE: &str = "{count} new jobs found";

/// A watched channel, written on the command line as `<id>-<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

impl Channel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let channel = Self {
            id: id.into(),
            name: name.into(),
        };
        channel.check()?;
        Ok(channel)
    }

    pub fn check(&self) -> Result<()> {
        validate_non_empty_string("channel.id", &self.id)?;
        validate_non_empty_string("channel.name", &self.name)?;
        validate_file_component("channel.name", &self.name)
    }

    pub fn state_file_name(&self) -> String {
        state_file_name(&self.name)
    }
}

pub fn state_file_name(channel_name: &str) -> String {
    format!("last_messages_{}.csv", channel_name)
}

impl FromStr for Channel {
    type Err = WatchError;

    fn from_str(spec: &str) -> Result<Self> {
        let (id, name) =
            spec.trim()
                .split_once('-')
                .ok_or_else(|| WatchError::InvalidConfigValueError {
                    field: "channel".to_string(),
                    value: spec.to_string(),
                    reason: "expected <id>-<name>".to_string(),
                })?;
        Channel::new(id, name)
    }
}

/// One chat message as seen by the watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub timestamp: DateTime<FixedOffset>,
    pub content: String,
    pub channel_id: String,
    pub channel_name: String,
}

impl Message {
    /// Content is trimmed and flattened to a single line.
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
        content: &str,
        channel_id: impl Into<String>,
        channel_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            content: content.trim().replace('\n', ""),
            channel_id: channel_id.into(),
            channel_name: channel_name.into(),
        }
    }

    pub fn to_state_line(&self) -> Result<String> {
        let timestamp = self.timestamp.format(STATE_TIMESTAMP_FORMAT).to_string();
        write_state_record(&[
            timestamp.as_str(),
            self.id.as_str(),
            self.content.as_str(),
            self.channel_id.as_str(),
            self.channel_name.as_str(),
        ])
    }

    pub fn from_state_line(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);

        let record = quoted_record(line);
        let fields: Vec<&str> = match &record {
            Some(record) => record.iter().collect(),
            // Older files were written without quoting: a `;` in the content
            // splits it into extra middle fields and quotes are literal text.
            None => line.split(';').collect(),
        };

        let count = fields.len();
        if count < STATE_FIELDS {
            return Err(WatchError::StateRecordError {
                message: format!("expected {} fields, found {}: {}", STATE_FIELDS, count, line),
            });
        }

        let timestamp = DateTime::parse_from_str(fields[0], STATE_TIMESTAMP_PARSE_FORMAT)
            .map_err(|e| WatchError::StateRecordError {
                message: format!("bad timestamp '{}': {}", fields[0], e),
            })?;

        Ok(Self {
            id: fields[1].to_string(),
            timestamp,
            content: fields[2..count - 2].join(";"),
            channel_id: fields[count - 2].to_string(),
            channel_name: fields[count - 1].to_string(),
        })
    }

    pub fn state_file_name(&self) -> String {
        state_file_name(&self.channel_name)
    }

    pub fn to_mail_line(&self, tz: &Tz) -> String {
        let posted = self.timestamp.with_timezone(tz).format(MAIL_TIMESTAMP_FORMAT);
        format!("In {} at {} : {}\n\n", self.channel_name, posted, self.content)
    }
}

fn write_state_record(fields: &[&str]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;

    let bytes = writer
        .into_inner()
        .map_err(|e| WatchError::IoError(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| WatchError::StateRecordError {
        message: format!("state line is not UTF-8: {}", e),
    })
}

/// The record of a line in the quoted layout `to_state_line` writes. `None`
/// when the line only reads back as CSV by accident, such as unquoted content
/// that happens to start with `"`.
fn quoted_record(line: &str) -> Option<csv::StringRecord> {
    if !line.contains('"') {
        return None;
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    let record = reader.records().next()?.ok()?;
    if record.len() != STATE_FIELDS {
        return None;
    }

    let rewritten = write_state_record(&record.iter().collect::<Vec<_>>()).ok()?;
    (rewritten.trim_end_matches('\n') == line).then_some(record)
}

/// The batch of new messages that goes out in one email.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Digest {
    pub messages: Vec<Message>,
}

impl Digest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn subject(&self, template: &str) -> String {
        template.replace("{count}", &self.len().to_string())
    }

    pub fn body(&self, tz: &Tz) -> String {
        self.messages.iter().map(|m| m.to_mail_line(tz)).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub fetched: usize,
    pub new: usize,
    pub notified: bool,
}
