/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SYNCLOG Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use synclog_protocol::RecordKind;

use crate::host::IncomingMessage;
use crate::message_cache::{AttachmentRef, MessageAuthor, MessageSnapshot};

/// A detected edit or delete, carrying everything the formatter needs.
/// Captured in full before any suspension point; never re-read from the
/// cache afterwards.
#[derive(Debug, Clone)]
pub struct Change {
    pub kind: RecordKind,
    pub message_id: String,
    pub channel_id: String,
    pub old_content: String,
    pub new_content: String,
    pub author: Option<MessageAuthor>,
    pub attachments: Vec<AttachmentRef>,
}

/// Result of evaluating an update event: the change (if the content really
/// differed) and the merged snapshot the cache must be refreshed with
/// regardless of the outcome.
#[derive(Debug)]
pub struct UpdateOutcome {
    pub change: Option<Change>,
    pub merged: MessageSnapshot,
}

/// Correlates an incoming update against the last-known state. Old content
/// precedence: our cache wins over the host store lookup. An event that
/// carries no content field at all never counts as a change.
pub fn on_update(
    event: &IncomingMessage,
    cached: Option<&MessageSnapshot>,
    store: Option<&MessageSnapshot>,
    now_ms: i64,
) -> UpdateOutcome {
    let old_content = cached
        .map(|s| s.content.clone())
        .or_else(|| store.map(|s| s.content.clone()));
    let author = cached
        .and_then(|s| s.author.clone())
        .or_else(|| store.and_then(|s| s.author.clone()))
        .or_else(|| event.author.clone());
    let attachments = cached
        .map(|s| s.attachments.clone())
        .or_else(|| store.map(|s| s.attachments.clone()))
        .unwrap_or_default();

    let change = match (&event.content, &old_content) {
        (Some(new_content), Some(old)) if old != new_content => Some(Change {
            kind: RecordKind::Edit,
            message_id: event.id.clone(),
            channel_id: event.channel_id.clone(),
            old_content: old.clone(),
            new_content: new_content.clone(),
            author: author.clone(),
            attachments: attachments.clone(),
        }),
        _ => None,
    };

    let merged = MessageSnapshot {
        id: event.id.clone(),
        channel_id: event.channel_id.clone(),
        content: event
            .content
            .clone()
            .or(old_content)
            .unwrap_or_default(),
        author,
        attachments: event.attachments.clone().unwrap_or(attachments),
        observed_at_ms: now_ms,
        history_text: cached.and_then(|s| s.history_text.clone()),
    };

    UpdateOutcome { change, merged }
}

/// Evaluates a delete against the last-known snapshot. With neither content
/// nor attachments recoverable there is nothing to report; messages never
/// observed before deletion cannot be logged.
pub fn on_delete(
    message_id: &str,
    channel_id: &str,
    snapshot: Option<&MessageSnapshot>,
) -> Option<Change> {
    let snapshot = snapshot?;
    if snapshot.content.is_empty() && snapshot.attachments.is_empty() {
        return None;
    }
    Some(Change {
        kind: RecordKind::Delete,
        message_id: message_id.to_string(),
        channel_id: channel_id.to_string(),
        old_content: snapshot.content.clone(),
        new_content: String::new(),
        author: snapshot.author.clone(),
        attachments: snapshot.attachments.clone(),
    })
}
