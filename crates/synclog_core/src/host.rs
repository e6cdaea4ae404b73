/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SYNCLOG Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::message_cache::{AttachmentRef, MessageAuthor, MessageSnapshot};

/// Read access into the host chat client. The host message store is only a
/// fallback for messages our own cache never saw.
pub trait HostStore: Send + Sync {
    fn message(&self, channel_id: &str, message_id: &str) -> Option<MessageSnapshot>;
    fn channel_messages(&self, channel_id: &str) -> Vec<MessageSnapshot>;
    fn current_user_id(&self) -> Option<String>;
    /// Token for the destination's authenticated read API. Resolved at call
    /// time; it is usually not available yet when the subsystem starts.
    fn auth_token(&self) -> Option<String>;
}

/// A message recreated from a destination record because the host no longer
/// has it. The sink owns how (and whether) this surfaces in the client.
#[derive(Debug, Clone)]
pub struct GhostMessage {
    pub message_id: String,
    pub channel_id: String,
    pub content: String,
    pub author_display: String,
    pub recorded_at: String,
}

/// Downstream consumer of replay decisions. The core never patches any UI
/// itself; it only reports "this message is logically deleted" and hands
/// over ghost recreation data.
pub trait ReplaySink: Send + Sync {
    fn has_message(&self, channel_id: &str, message_id: &str) -> bool;
    fn is_deleted(&self, channel_id: &str, message_id: &str) -> bool;
    fn mark_deleted(&self, channel_id: &str, message_id: &str);
    fn insert_ghost(&self, ghost: GhostMessage);
}

/// A message-lifecycle payload as extracted by the host integration.
/// `content: None` means the event carried no content field at all (an
/// embed-only update, say), which is distinct from empty content.
#[derive(Debug, Clone, Default)]
pub struct IncomingMessage {
    pub id: String,
    pub channel_id: String,
    pub content: Option<String>,
    pub author: Option<MessageAuthor>,
    pub attachments: Option<Vec<AttachmentRef>>,
}

impl IncomingMessage {
    pub fn into_snapshot(self, observed_at_ms: i64) -> MessageSnapshot {
        MessageSnapshot {
            id: self.id,
            channel_id: self.channel_id,
            content: self.content.unwrap_or_default(),
            author: self.author,
            attachments: self.attachments.unwrap_or_default(),
            observed_at_ms,
            history_text: None,
        }
    }
}

/// Typed event stream the host integration feeds into the core, one variant
/// per subscribed host event kind.
#[derive(Debug, Clone)]
pub enum MessageEvent {
    Created(IncomingMessage),
    Updated(IncomingMessage),
    Deleted {
        channel_id: String,
        message_id: String,
    },
    BulkDeleted {
        channel_id: String,
        message_ids: Vec<String>,
    },
    PageLoaded {
        channel_id: String,
        messages: Vec<IncomingMessage>,
    },
    ChannelSelected {
        channel_id: String,
    },
    ConnectionOpen,
}
