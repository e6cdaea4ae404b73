/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SYNCLOG Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::DateTime;
use synclog_protocol::{classify_title, parse_footer, ChannelEmbed, ChannelMessage, RecordKind};
use tracing::{debug, info};

use crate::destination::Destination;
use crate::format::{
    format_history_block, strip_attachment_block, FIELD_AFTER, FIELD_BEFORE, FIELD_USER,
    GHOST_PLACEHOLDER, UNKNOWN_USER,
};
use crate::history_db::HistoryDb;
use crate::host::{GhostMessage, ReplaySink};

/// One record parsed back from the destination, keyed into a per-channel
/// list. Ephemeral: rebuilt from scratch on every reconnect.
#[derive(Debug, Clone)]
pub struct ReconstructionEntry {
    pub kind: RecordKind,
    pub message_id: String,
    pub channel_id: String,
    pub old_content: String,
    pub new_content: Option<String>,
    pub recorded_at: String,
    pub author_display: String,
}

#[derive(Default)]
struct ReconstructionState {
    entries: HashMap<String, Vec<ReconstructionEntry>>,
    reconciled: HashSet<String>,
    webhook_channel_id: Option<String>,
    loaded: bool,
}

/// Rebuilds local history and deletion state from previously-sent records
/// after a restart or reconnect. Loading happens once per session; each
/// origin channel is replayed at most once as it becomes relevant. A load
/// failure leaves the session in the never-loaded state: reconstruction is
/// simply skipped, not retried.
pub struct ReconstructionEngine {
    destination: Arc<dyn Destination>,
    page_size: u32,
    max_pages: u32,
    state: Mutex<ReconstructionState>,
}

impl ReconstructionEngine {
    pub fn new(destination: Arc<dyn Destination>, page_size: u32, max_pages: u32) -> Self {
        Self {
            destination,
            page_size: page_size.clamp(1, 100),
            max_pages: max_pages.max(1),
            state: Mutex::new(ReconstructionState::default()),
        }
    }

    pub fn reset(&self) {
        *self.state.lock().unwrap() = ReconstructionState::default();
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().unwrap().loaded
    }

    pub async fn load(&self, webhook_url: &str, token: &str) -> Result<()> {
        let info = self
            .destination
            .webhook_info(webhook_url.trim())
            .await
            .context("resolve webhook channel")?;
        let channel_id = info
            .channel_id
            .filter(|v| !v.is_empty())
            .context("webhook info carries no channel id")?;
        self.state.lock().unwrap().webhook_channel_id = Some(channel_id.clone());

        let mut records: Vec<ChannelMessage> = Vec::new();
        let mut before: Option<String> = None;
        for _ in 0..self.max_pages {
            let page = self
                .destination
                .channel_messages(token, &channel_id, self.page_size, before.as_deref())
                .await?;
            if page.is_empty() {
                break;
            }
            let short_page = (page.len() as u32) < self.page_size;
            before = page.last().map(|m| m.id.clone());
            records.extend(page);
            if short_page {
                break;
            }
        }
        info!(count = records.len(), "destination records loaded for reconstruction");

        let entries = parse_records(&records);
        let mut state = self.state.lock().unwrap();
        state.entries = entries;
        state.loaded = true;
        Ok(())
    }

    /// Replays the channel's entries exactly once per session. EDIT entries
    /// fold into persisted history only when no local history exists (local
    /// always wins); DELETE entries only act when the host does not already
    /// know the message as deleted.
    pub fn reconcile_channel(
        &self,
        channel_id: &str,
        history: &HistoryDb,
        sink: &dyn ReplaySink,
        local_history_enabled: bool,
        now_ms: i64,
    ) {
        let entries = {
            let mut state = self.state.lock().unwrap();
            if !state.loaded || state.reconciled.contains(channel_id) {
                return;
            }
            state.reconciled.insert(channel_id.to_string());
            state.entries.get(channel_id).cloned().unwrap_or_default()
        };
        if entries.is_empty() {
            return;
        }
        debug!(channel_id, count = entries.len(), "reconciling channel");

        if local_history_enabled {
            let mut edits: HashMap<&str, Vec<&ReconstructionEntry>> = HashMap::new();
            for entry in entries.iter().filter(|e| e.kind == RecordKind::Edit) {
                edits.entry(&entry.message_id).or_default().push(entry);
            }
            for (message_id, mut list) in edits {
                list.sort_by_key(|e| timestamp_key(&e.recorded_at));
                let text: String = list
                    .iter()
                    .map(|e| format_history_block(&e.old_content, &e.recorded_at))
                    .collect();
                let _ = history.set_if_empty(message_id, &text, now_ms);
            }
        }

        for entry in entries.iter().filter(|e| e.kind == RecordKind::Delete) {
            if sink.is_deleted(channel_id, &entry.message_id) {
                continue;
            }
            if !sink.has_message(channel_id, &entry.message_id) {
                let content = if entry.old_content.is_empty() {
                    GHOST_PLACEHOLDER.to_string()
                } else {
                    entry.old_content.clone()
                };
                sink.insert_ghost(GhostMessage {
                    message_id: entry.message_id.clone(),
                    channel_id: channel_id.to_string(),
                    content,
                    author_display: entry.author_display.clone(),
                    recorded_at: entry.recorded_at.clone(),
                });
            }
            sink.mark_deleted(channel_id, &entry.message_id);
        }
    }
}

/// Parses destination messages into per-channel entry lists. Malformed
/// records (foreign embeds, missing footer, unknown title) are skipped
/// individually.
fn parse_records(records: &[ChannelMessage]) -> HashMap<String, Vec<ReconstructionEntry>> {
    let mut grouped: HashMap<String, Vec<ReconstructionEntry>> = HashMap::new();
    for message in records {
        for embed in &message.embeds {
            let Some(entry) = parse_embed(embed, message.timestamp.as_deref()) else {
                continue;
            };
            grouped
                .entry(entry.channel_id.clone())
                .or_default()
                .push(entry);
        }
    }
    grouped
}

fn parse_embed(embed: &ChannelEmbed, fallback_ts: Option<&str>) -> Option<ReconstructionEntry> {
    let footer = embed.footer.as_ref()?.text.as_deref()?;
    let (message_id, channel_id) = parse_footer(footer)?;
    let kind = classify_title(embed.title.as_deref()?)?;

    let mut old_content = String::new();
    let mut new_content = None;
    let mut author_display = UNKNOWN_USER.to_string();
    for field in &embed.fields {
        match field.name.as_str() {
            FIELD_BEFORE => old_content = strip_attachment_block(&field.value).to_string(),
            FIELD_AFTER => new_content = Some(field.value.clone()),
            FIELD_USER => author_display = field.value.clone(),
            _ => {}
        }
    }

    let recorded_at = embed
        .timestamp
        .as_deref()
        .or(fallback_ts)
        .unwrap_or_default()
        .to_string();

    Some(ReconstructionEntry {
        kind,
        message_id,
        channel_id,
        old_content,
        new_content,
        recorded_at,
        author_display,
    })
}

fn timestamp_key(recorded_at: &str) -> i64 {
    DateTime::parse_from_rfc3339(recorded_at)
        .map(|t| t.timestamp_millis())
        .unwrap_or(0)
}
