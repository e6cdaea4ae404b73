/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SYNCLOG Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use synclog_protocol::{classify_title, parse_footer, RecordKind};
use tracing::debug;

use crate::destination::Destination;

/// Checks the destination's recent history for an already-delivered record
/// before transmitting. Callers invoke this only after a settle delay, so
/// duplicate event storms collapse onto one detected change first.
///
/// Any failure fails open: a broken dedup check must never block a
/// legitimate delivery.
pub struct DedupGuard {
    destination: Arc<dyn Destination>,
    channel_id: Mutex<Option<String>>,
    scan_limit: u32,
}

impl DedupGuard {
    pub fn new(destination: Arc<dyn Destination>, scan_limit: u32) -> Self {
        Self {
            destination,
            channel_id: Mutex::new(None),
            scan_limit,
        }
    }

    pub fn clear(&self) {
        *self.channel_id.lock().unwrap() = None;
    }

    pub async fn is_duplicate(
        &self,
        webhook_url: &str,
        token: Option<&str>,
        message_id: &str,
        kind: RecordKind,
    ) -> bool {
        match self.check(webhook_url, token, message_id, kind).await {
            Ok(found) => found,
            Err(e) => {
                debug!("dedup check failed, treating record as new: {e:#}");
                false
            }
        }
    }

    async fn check(
        &self,
        webhook_url: &str,
        token: Option<&str>,
        message_id: &str,
        kind: RecordKind,
    ) -> Result<bool> {
        let token = token.context("no auth token for dedup read")?;
        let channel_id = self.resolve_channel(webhook_url).await?;
        let messages = self
            .destination
            .channel_messages(token, &channel_id, self.scan_limit, None)
            .await?;
        for message in messages {
            for embed in message.embeds {
                let Some(footer) = embed.footer.as_ref().and_then(|f| f.text.as_deref()) else {
                    continue;
                };
                let Some((recorded_id, _)) = parse_footer(footer) else {
                    continue;
                };
                if recorded_id != message_id {
                    continue;
                }
                let Some(recorded_kind) = embed.title.as_deref().and_then(classify_title) else {
                    continue;
                };
                if recorded_kind == kind {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn resolve_channel(&self, webhook_url: &str) -> Result<String> {
        if let Some(id) = self.channel_id.lock().unwrap().clone() {
            return Ok(id);
        }
        let info = self.destination.webhook_info(webhook_url).await?;
        let id = info
            .channel_id
            .filter(|v| !v.is_empty())
            .context("webhook info carries no channel id")?;
        *self.channel_id.lock().unwrap() = Some(id.clone());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use synclog_protocol::{
        ChannelEmbed, ChannelEmbedFooter, ChannelMessage, OutboundRecord, WebhookInfo,
    };

    struct FakeDestination {
        messages: Vec<ChannelMessage>,
        info_calls: AtomicUsize,
        fail_reads: bool,
    }

    impl FakeDestination {
        fn with_history(messages: Vec<ChannelMessage>) -> Self {
            Self {
                messages,
                info_calls: AtomicUsize::new(0),
                fail_reads: false,
            }
        }
    }

    #[async_trait]
    impl Destination for FakeDestination {
        async fn webhook_info(&self, _webhook_url: &str) -> anyhow::Result<WebhookInfo> {
            self.info_calls.fetch_add(1, Ordering::SeqCst);
            Ok(WebhookInfo {
                channel_id: Some("dest-ch".to_string()),
                guild_id: None,
            })
        }

        async fn execute_webhook(
            &self,
            _webhook_url: &str,
            _record: &OutboundRecord,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn channel_messages(
            &self,
            _token: &str,
            _channel_id: &str,
            _limit: u32,
            _before: Option<&str>,
        ) -> anyhow::Result<Vec<ChannelMessage>> {
            if self.fail_reads {
                anyhow::bail!("read failed")
            }
            Ok(self.messages.clone())
        }
    }

    fn recorded(id: u64, title: &str, footer: &str) -> ChannelMessage {
        ChannelMessage {
            id: id.to_string(),
            timestamp: None,
            embeds: vec![ChannelEmbed {
                title: Some(title.to_string()),
                fields: Vec::new(),
                timestamp: None,
                footer: Some(ChannelEmbedFooter {
                    text: Some(footer.to_string()),
                }),
            }],
        }
    }

    const URL: &str = "https://discord.com/api/webhooks/1/t";

    #[tokio::test]
    async fn matches_on_message_id_and_kind() {
        let dest = Arc::new(FakeDestination::with_history(vec![recorded(
            1,
            "💻 ✏️ Bearbeitet (PC)",
            "msgId:42|chId:9",
        )]));
        let guard = DedupGuard::new(dest, 25);
        assert!(guard.is_duplicate(URL, Some("tok"), "42", RecordKind::Edit).await);
        assert!(!guard.is_duplicate(URL, Some("tok"), "42", RecordKind::Delete).await);
        assert!(!guard.is_duplicate(URL, Some("tok"), "43", RecordKind::Edit).await);
    }

    #[tokio::test]
    async fn channel_resolution_is_cached() {
        let dest = Arc::new(FakeDestination::with_history(Vec::new()));
        let guard = DedupGuard::new(dest.clone(), 25);
        let _ = guard.is_duplicate(URL, Some("tok"), "1", RecordKind::Edit).await;
        let _ = guard.is_duplicate(URL, Some("tok"), "2", RecordKind::Edit).await;
        assert_eq!(dest.info_calls.load(Ordering::SeqCst), 1);
        guard.clear();
        let _ = guard.is_duplicate(URL, Some("tok"), "3", RecordKind::Edit).await;
        assert_eq!(dest.info_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_fail_open() {
        let dest = Arc::new(FakeDestination {
            messages: Vec::new(),
            info_calls: AtomicUsize::new(0),
            fail_reads: true,
        });
        let guard = DedupGuard::new(dest, 25);
        assert!(!guard.is_duplicate(URL, Some("tok"), "42", RecordKind::Edit).await);
        assert!(!guard.is_duplicate(URL, None, "42", RecordKind::Edit).await);
    }

    #[tokio::test]
    async fn foreign_records_are_skipped() {
        let dest = Arc::new(FakeDestination::with_history(vec![
            recorded(1, "some bot embed", "not-our-footer"),
            recorded(2, "💻 🗑️ Gelöscht (PC)", "msgId:42|chId:9"),
        ]));
        let guard = DedupGuard::new(dest, 25);
        assert!(guard.is_duplicate(URL, Some("tok"), "42", RecordKind::Delete).await);
    }
}
