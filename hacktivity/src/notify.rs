use std::io::Write;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

/// Incoming-webhook message: one attachment per disclosure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub author_name: String,
    pub author_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_icon: Option<String>,
    pub title: String,
    pub title_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    pub footer: String,
    pub footer_icon: String,
    pub fallback: String,
    pub mrkdwn_in: Vec<String>,
    #[serde(rename = "ts", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl Field {
    pub fn short(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            short: true,
        }
    }
}

/// Destination for rendered notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, payload: &Payload) -> Result<()>;
    fn name(&self) -> &str;
}

/// Prints payloads as JSON instead of delivering them.
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn deliver(&self, payload: &Payload) -> Result<()> {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        write_payload(payload, &mut lock)
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

pub fn write_payload(payload: &Payload, writer: &mut dyn Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, payload).context("failed to encode payload")?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
