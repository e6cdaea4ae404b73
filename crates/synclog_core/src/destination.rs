/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SYNCLOG Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use synclog_protocol::{ChannelMessage, OutboundRecord, WebhookInfo};

/// Access to the destination: the webhook that receives records and the
/// authenticated read API over its backing channel. Injected as a trait so
/// tests run against an in-memory destination.
#[async_trait]
pub trait Destination: Send + Sync {
    async fn webhook_info(&self, webhook_url: &str) -> Result<WebhookInfo>;
    async fn execute_webhook(&self, webhook_url: &str, record: &OutboundRecord) -> Result<()>;
    /// One descending page of the channel's history, newest first, paged
    /// with a `before` cursor. Page size is capped at 100 by the API.
    async fn channel_messages(
        &self,
        token: &str,
        channel_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<ChannelMessage>>;
}

pub struct HttpDestination {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpDestination {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base_url: api_base_url.into(),
        }
    }
}

#[async_trait]
impl Destination for HttpDestination {
    async fn webhook_info(&self, webhook_url: &str) -> Result<WebhookInfo> {
        let url = webhook_url.trim().trim_end_matches('/');
        let info = self
            .client
            .get(url)
            .send()
            .await
            .context("fetch webhook info")?
            .error_for_status()
            .context("webhook info not ok")?
            .json::<WebhookInfo>()
            .await
            .context("parse webhook info")?;
        Ok(info)
    }

    async fn execute_webhook(&self, webhook_url: &str, record: &OutboundRecord) -> Result<()> {
        let resp = self
            .client
            .post(webhook_url.trim())
            .json(record)
            .send()
            .await
            .context("post webhook")?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("webhook rejected: {status} {detail}");
        }
        Ok(())
    }

    async fn channel_messages(
        &self,
        token: &str,
        channel_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<ChannelMessage>> {
        let mut url = format!(
            "{}/channels/{}/messages?limit={}",
            self.api_base_url.trim_end_matches('/'),
            channel_id,
            limit.min(100)
        );
        if let Some(before) = before {
            url.push_str(&format!("&before={before}"));
        }
        let messages = self
            .client
            .get(&url)
            .header("Authorization", token)
            .send()
            .await
            .with_context(|| format!("fetch channel messages: {channel_id}"))?
            .error_for_status()
            .context("channel messages not ok")?
            .json::<Vec<ChannelMessage>>()
            .await
            .context("parse channel messages")?;
        Ok(messages)
    }
}
