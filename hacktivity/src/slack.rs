use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::instrument;

use crate::notify::{Notifier, Payload};

/// Slack incoming webhook.
pub struct SlackWebhook {
    client: reqwest::Client,
    url: String,
}

impl SlackWebhook {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        let parsed = reqwest::Url::parse(&url).with_context(|| format!("invalid webhook URL: {url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("webhook URL must be http or https: {url}");
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("hacktivity/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for SlackWebhook {
    #[instrument(skip(self, payload), fields(username = %payload.username))]
    async fn deliver(&self, payload: &Payload) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .context("webhook request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("webhook returned HTTP {status}: {body}");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "slack"
    }
}
