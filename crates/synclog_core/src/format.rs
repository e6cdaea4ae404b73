/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SYNCLOG Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use chrono::{SecondsFormat, Utc};
use synclog_protocol::{
    encode_footer, EmbedField, EmbedFooter, OutboundRecord, RecordEmbed, RecordKind, DELETE_COLOR,
    DELETE_MARKER, EDIT_COLOR, EDIT_MARKER,
};

use crate::detect::Change;
use crate::message_cache::MessageAuthor;

pub const UNKNOWN_USER: &str = "Unbekannt";
pub const NO_TEXT_PLACEHOLDER: &str = "*Nur Bild/Kein Text*";
pub const EMPTIED_PLACEHOLDER: &str = "*Leergemacht*";
pub const DELETED_PLACEHOLDER: &str = "*Wurde komplett gelöscht*";
pub const GHOST_PLACEHOLDER: &str = "*Gelöschte Nachricht*";
pub const ATTACHMENT_HEADER: &str = "**📎 Anhänge:**";

pub const FIELD_USER: &str = "User";
pub const FIELD_CHANNEL: &str = "Kanal";
pub const FIELD_BEFORE: &str = "Vorher";
pub const FIELD_AFTER: &str = "Nachher";

/// Builds the wire record for a detected change. The footer encodes message
/// and channel identity; the dedup guard and reconstruction both parse it
/// back, so nothing here may be lossy.
pub fn format_record(change: &Change, origin_emoji: &str, origin_label: &str) -> OutboundRecord {
    let (marker, verb, color) = match change.kind {
        RecordKind::Edit => (EDIT_MARKER, "Bearbeitet", EDIT_COLOR),
        RecordKind::Delete => (DELETE_MARKER, "Gelöscht", DELETE_COLOR),
    };
    let title = format!("{origin_emoji} {marker} {verb} ({origin_label})");

    let before = if change.old_content.is_empty() {
        NO_TEXT_PLACEHOLDER.to_string()
    } else {
        change.old_content.clone()
    };
    let before = format!("{before}{}", attachment_block(change));

    let after = match change.kind {
        RecordKind::Edit if change.new_content.is_empty() => EMPTIED_PLACEHOLDER.to_string(),
        RecordKind::Edit => change.new_content.clone(),
        RecordKind::Delete => DELETED_PLACEHOLDER.to_string(),
    };

    OutboundRecord {
        embeds: vec![RecordEmbed {
            title,
            color,
            fields: vec![
                EmbedField {
                    name: FIELD_USER.to_string(),
                    value: display_user(change.author.as_ref()),
                    inline: true,
                },
                EmbedField {
                    name: FIELD_CHANNEL.to_string(),
                    value: format!("<#{}>", change.channel_id),
                    inline: true,
                },
                EmbedField {
                    name: FIELD_BEFORE.to_string(),
                    value: before,
                    inline: false,
                },
                EmbedField {
                    name: FIELD_AFTER.to_string(),
                    value: after,
                    inline: false,
                },
            ],
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            footer: EmbedFooter {
                text: encode_footer(&change.message_id, &change.channel_id),
            },
        }],
    }
}

/// `username#discriminator`, or the bare username under the tagless identity
/// scheme (discriminator sentinel "0"/"0000").
pub fn display_user(author: Option<&MessageAuthor>) -> String {
    let Some(author) = author else {
        return UNKNOWN_USER.to_string();
    };
    if author.username.is_empty() {
        return UNKNOWN_USER.to_string();
    }
    match author.discriminator.as_str() {
        "" | "0" | "0000" => author.username.clone(),
        tag => format!("{}#{tag}", author.username),
    }
}

fn attachment_block(change: &Change) -> String {
    let links: Vec<&str> = change
        .attachments
        .iter()
        .filter_map(|a| a.link())
        .collect();
    if links.is_empty() {
        return String::new();
    }
    format!("\n\n{ATTACHMENT_HEADER}\n{}", links.join("\n"))
}

/// Strips the appended attachment block back off a before-field value when
/// parsing a record, leaving the plain old content.
pub fn strip_attachment_block(value: &str) -> &str {
    match value.find(&format!("\n\n{ATTACHMENT_HEADER}")) {
        Some(idx) => &value[..idx],
        None => value,
    }
}

/// One accumulated history block per real edit. Reconstruction produces the
/// same shape when it folds remote records into local history.
pub fn format_history_block(old_content: &str, recorded_at: &str) -> String {
    format!("[{recorded_at}] {old_content}\n")
}
