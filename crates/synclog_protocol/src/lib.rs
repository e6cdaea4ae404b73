/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SYNCLOG Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::{Deserialize, Serialize};

/// Title marker substrings. Both the writer (record formatter) and the
/// readers (dedup guard, reconstruction) depend on these exact strings.
pub const EDIT_MARKER: &str = "✏️";
pub const DELETE_MARKER: &str = "🗑️";

pub const EDIT_COLOR: u32 = 16_753_920;
pub const DELETE_COLOR: u32 = 15_158_332;

const FOOTER_MSG_PREFIX: &str = "msgId:";
const FOOTER_CH_PREFIX: &str = "chId:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Edit,
    Delete,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutboundRecord {
    pub embeds: Vec<RecordEmbed>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecordEmbed {
    pub title: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
    pub footer: EmbedFooter,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EmbedFooter {
    pub text: String,
}

/// Webhook metadata returned by a bare GET on the webhook URL.
#[derive(Debug, Deserialize, Clone)]
pub struct WebhookInfo {
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub guild_id: Option<String>,
}

/// A message read back from the destination channel. Lenient on purpose:
/// the channel may contain messages that are not ours at all.
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelMessage {
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub embeds: Vec<ChannelEmbed>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelEmbed {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub fields: Vec<ChannelEmbedField>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub footer: Option<ChannelEmbedFooter>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelEmbedField {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelEmbedFooter {
    #[serde(default)]
    pub text: Option<String>,
}

/// Footer format: `msgId:<messageId>|chId:<channelId>`. The full form is
/// used because one destination aggregates records from many channels.
pub fn encode_footer(message_id: &str, channel_id: &str) -> String {
    format!("{FOOTER_MSG_PREFIX}{message_id}|{FOOTER_CH_PREFIX}{channel_id}")
}

pub fn parse_footer(text: &str) -> Option<(String, String)> {
    let rest = text.strip_prefix(FOOTER_MSG_PREFIX)?;
    let (message_id, rest) = rest.split_once('|')?;
    let channel_id = rest.strip_prefix(FOOTER_CH_PREFIX)?;
    if message_id.is_empty() || channel_id.is_empty() {
        return None;
    }
    Some((message_id.to_string(), channel_id.to_string()))
}

/// Classifies an embed title by its marker substring. Titles carrying
/// neither marker (or both, which we never produce) are not ours.
pub fn classify_title(title: &str) -> Option<RecordKind> {
    let edit = title.contains(EDIT_MARKER);
    let delete = title.contains(DELETE_MARKER);
    match (edit, delete) {
        (true, false) => Some(RecordKind::Edit),
        (false, true) => Some(RecordKind::Delete),
        _ => None,
    }
}
