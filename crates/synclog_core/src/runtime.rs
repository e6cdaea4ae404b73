/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SYNCLOG Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::dedup::DedupGuard;
use crate::destination::{Destination, HttpDestination};
use crate::detect;
use crate::filter;
use crate::format;
use crate::history_db::HistoryDb;
use crate::host::{HostStore, IncomingMessage, MessageEvent, ReplaySink};
use crate::message_cache::{BoundedMessageCache, MessageSnapshot};
use crate::reconstruct::ReconstructionEngine;
use crate::transmit::Transmitter;

/// One logger instance per subsystem activation: constructed on start,
/// discarded wholesale on stop. Nothing global; only the sqlite history
/// survives a stop.
#[derive(Clone)]
pub struct LoggerCore {
    settings: Arc<Settings>,
    cache: Arc<Mutex<BoundedMessageCache>>,
    history: HistoryDb,
    host: Arc<dyn HostStore>,
    sink: Arc<dyn ReplaySink>,
    transmitter: Arc<Transmitter>,
    dedup: Arc<DedupGuard>,
    reconstruction: Arc<ReconstructionEngine>,
}

impl LoggerCore {
    /// Opens against the real HTTP destination derived from the settings.
    pub fn open(
        settings: Settings,
        db_path: impl AsRef<Path>,
        host: Arc<dyn HostStore>,
        sink: Arc<dyn ReplaySink>,
    ) -> Result<Self> {
        let destination: Arc<dyn Destination> =
            Arc::new(HttpDestination::new(settings.api_base_url.clone()));
        Self::with_destination(settings, db_path, host, sink, destination)
    }

    pub fn with_destination(
        settings: Settings,
        db_path: impl AsRef<Path>,
        host: Arc<dyn HostStore>,
        sink: Arc<dyn ReplaySink>,
        destination: Arc<dyn Destination>,
    ) -> Result<Self> {
        let history = HistoryDb::open(db_path)?;
        let cache = BoundedMessageCache::new(settings.cache_capacity);
        let dedup = DedupGuard::new(destination.clone(), settings.dedup_scan_limit);
        let reconstruction = ReconstructionEngine::new(
            destination.clone(),
            settings.reconstruct_page_size,
            settings.reconstruct_max_pages,
        );
        Ok(Self {
            settings: Arc::new(settings),
            cache: Arc::new(Mutex::new(cache)),
            history,
            host,
            sink,
            transmitter: Arc::new(Transmitter::new(destination)),
            dedup: Arc::new(dedup),
            reconstruction: Arc::new(reconstruction),
        })
    }

    /// Dispatch for the typed event stream. Handlers run to completion
    /// without suspending; anything that needs the network is handed a full
    /// copy of its data and spawned.
    pub fn handle_event(&self, event: MessageEvent) {
        match event {
            MessageEvent::Created(message) => self.on_message_create(message),
            MessageEvent::Updated(message) => self.on_message_update(message),
            MessageEvent::Deleted {
                channel_id,
                message_id,
            } => self.on_message_delete(&channel_id, &message_id),
            MessageEvent::BulkDeleted {
                channel_id,
                message_ids,
            } => self.on_message_delete_bulk(&channel_id, &message_ids),
            MessageEvent::PageLoaded {
                channel_id,
                messages,
            } => self.on_page_loaded(&channel_id, messages),
            MessageEvent::ChannelSelected { channel_id } => self.on_channel_selected(&channel_id),
            MessageEvent::ConnectionOpen => self.on_connection_open(),
        }
    }

    pub fn on_message_create(&self, message: IncomingMessage) {
        if message.id.is_empty() {
            return;
        }
        let snapshot = message.into_snapshot(now_ms());
        self.cache.lock().unwrap().put(snapshot);
    }

    pub fn on_message_update(&self, message: IncomingMessage) {
        if message.id.is_empty() || message.channel_id.is_empty() {
            return;
        }
        let cached = self.cache.lock().unwrap().get(&message.id).cloned();
        let store = self.host.message(&message.channel_id, &message.id);
        let outcome = detect::on_update(&message, cached.as_ref(), store.as_ref(), now_ms());
        let mut merged = outcome.merged;

        let change = outcome.change.filter(|change| {
            !filter::should_ignore(
                change.author.as_ref(),
                &self.settings,
                self.host.current_user_id().as_deref(),
            )
        });
        if let Some(change) = &change {
            if self.settings.enable_local_history {
                let block = format::format_history_block(&change.old_content, &now_rfc3339());
                if let Err(e) = self.history.append_block(&change.message_id, &block, now_ms()) {
                    warn!("history append failed: {e:#}");
                }
                let _ = self
                    .history
                    .prune_to_floor(self.settings.history_max_entries, self.settings.history_trim_to);
                let mut accumulated = merged.history_text.take().unwrap_or_default();
                accumulated.push_str(&block);
                merged.history_text = Some(accumulated);
            }
        }
        // The cache is refreshed whether or not a change was detected.
        self.cache.lock().unwrap().put(merged);

        if let Some(change) = change {
            self.dispatch_change(change);
        }
    }

    pub fn on_message_delete(&self, channel_id: &str, message_id: &str) {
        if channel_id.is_empty() || message_id.is_empty() {
            return;
        }
        let snapshot = self
            .cache
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .or_else(|| self.host.message(channel_id, message_id));
        let Some(change) = detect::on_delete(message_id, channel_id, snapshot.as_ref()) else {
            return;
        };
        self.cache.lock().unwrap().remove(message_id);
        if filter::should_ignore(
            change.author.as_ref(),
            &self.settings,
            self.host.current_user_id().as_deref(),
        ) {
            return;
        }
        self.dispatch_change(change);
    }

    pub fn on_message_delete_bulk(&self, channel_id: &str, message_ids: &[String]) {
        for message_id in message_ids {
            self.on_message_delete(channel_id, message_id);
        }
    }

    pub fn on_page_loaded(&self, channel_id: &str, messages: Vec<IncomingMessage>) {
        {
            let mut cache = self.cache.lock().unwrap();
            let now = now_ms();
            for message in messages {
                if message.id.is_empty() {
                    continue;
                }
                cache.put(message.into_snapshot(now));
            }
        }
        self.reconcile(channel_id);
    }

    pub fn on_channel_selected(&self, channel_id: &str) {
        if channel_id.is_empty() {
            return;
        }
        let messages = self.host.channel_messages(channel_id);
        {
            let mut cache = self.cache.lock().unwrap();
            let now = now_ms();
            for mut snapshot in messages {
                snapshot.observed_at_ms = now;
                cache.put(snapshot);
            }
        }
        self.reconcile(channel_id);
    }

    /// A (re-)connect invalidates everything reconstructed so far; the
    /// record history is reloaded from the destination in the background.
    pub fn on_connection_open(&self) {
        self.reconstruction.reset();
        self.dedup.clear();
        if !self.settings.webhook_url_valid() {
            return;
        }
        let Some(token) = self.host.auth_token() else {
            warn!("no auth token available, reconstruction skipped");
            return;
        };
        let engine = self.reconstruction.clone();
        let url = self.settings.webhook_url.trim().to_string();
        tokio::spawn(async move {
            if let Err(e) = engine.load(&url, &token).await {
                warn!("reconstruction load failed, skipping this session: {e:#}");
            }
        });
    }

    /// Clears all in-memory state. The persisted history store is the only
    /// thing that outlives the instance.
    pub fn stop(&self) {
        self.cache.lock().unwrap().clear();
        self.reconstruction.reset();
        self.dedup.clear();
    }

    /// Read interface for host-side rendering: last-known snapshot of a
    /// message, if we still hold one.
    pub fn snapshot(&self, message_id: &str) -> Option<MessageSnapshot> {
        self.cache.lock().unwrap().get(message_id).cloned()
    }

    /// Read interface for host-side rendering: accumulated edit history.
    pub fn history_text(&self, message_id: &str) -> Option<String> {
        self.history.get(message_id).ok().flatten()
    }

    fn reconcile(&self, channel_id: &str) {
        self.reconstruction.reconcile_channel(
            channel_id,
            &self.history,
            self.sink.as_ref(),
            self.settings.enable_local_history,
            now_ms(),
        );
    }

    /// Ships one detected change. Everything the continuation needs is
    /// captured here, before the first suspension point; the spawned task
    /// must never read the cache again, since a later event for the same id
    /// may run while it is parked on the settle delay.
    fn dispatch_change(&self, change: detect::Change) {
        if !self.settings.webhook_url_valid() {
            return;
        }
        let record = format::format_record(
            &change,
            &self.settings.origin_emoji,
            &self.settings.origin_label,
        );
        let webhook_url = self.settings.webhook_url.trim().to_string();
        let token = self.host.auth_token();
        let guard_enabled = self.settings.enable_delete_guard;
        let settle = Duration::from_millis(self.settings.dedup_settle_ms);
        let dedup = self.dedup.clone();
        let transmitter = self.transmitter.clone();
        let message_id = change.message_id;
        let kind = change.kind;
        tokio::spawn(async move {
            if guard_enabled {
                tokio::time::sleep(settle).await;
                if dedup
                    .is_duplicate(&webhook_url, token.as_deref(), &message_id, kind)
                    .await
                {
                    debug!(%message_id, "record already delivered, skipping");
                    return;
                }
            }
            transmitter.send(&webhook_url, &record).await;
        });
    }
}

/// Drains the host's event stream until it closes or shutdown is signalled,
/// then clears the instance.
pub fn start_event_worker(
    core: LoggerCore,
    mut events: mpsc::Receiver<MessageEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    core.handle_event(event);
                }
            }
        }
        core.stop();
    });
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .try_init()
        .ok();
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::GhostMessage;
    use crate::message_cache::MessageAuthor;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use synclog_protocol::{parse_footer, ChannelMessage, OutboundRecord, WebhookInfo};
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeHost {
        store: Mutex<Vec<MessageSnapshot>>,
        lookups: Mutex<Vec<(String, String)>>,
        user_id: Option<String>,
    }

    impl HostStore for FakeHost {
        fn message(&self, channel_id: &str, message_id: &str) -> Option<MessageSnapshot> {
            self.lookups
                .lock()
                .unwrap()
                .push((channel_id.to_string(), message_id.to_string()));
            self.store
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.id == message_id && s.channel_id == channel_id)
                .cloned()
        }

        fn channel_messages(&self, channel_id: &str) -> Vec<MessageSnapshot> {
            self.store
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.channel_id == channel_id)
                .cloned()
                .collect()
        }

        fn current_user_id(&self) -> Option<String> {
            self.user_id.clone()
        }

        fn auth_token(&self) -> Option<String> {
            Some("tok".to_string())
        }
    }

    #[derive(Default)]
    struct NullSink;

    impl ReplaySink for NullSink {
        fn has_message(&self, _channel_id: &str, _message_id: &str) -> bool {
            false
        }
        fn is_deleted(&self, _channel_id: &str, _message_id: &str) -> bool {
            false
        }
        fn mark_deleted(&self, _channel_id: &str, _message_id: &str) {}
        fn insert_ghost(&self, _ghost: GhostMessage) {}
    }

    #[derive(Default)]
    struct FakeDestination {
        sent: Mutex<Vec<OutboundRecord>>,
        history: Mutex<Vec<ChannelMessage>>,
        info_calls: AtomicUsize,
    }

    #[async_trait]
    impl Destination for FakeDestination {
        async fn webhook_info(&self, _webhook_url: &str) -> Result<WebhookInfo> {
            self.info_calls.fetch_add(1, Ordering::SeqCst);
            Ok(WebhookInfo {
                channel_id: Some("dest-ch".to_string()),
                guild_id: None,
            })
        }

        async fn execute_webhook(
            &self,
            _webhook_url: &str,
            record: &OutboundRecord,
        ) -> Result<()> {
            self.sent.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn channel_messages(
            &self,
            _token: &str,
            _channel_id: &str,
            _limit: u32,
            _before: Option<&str>,
        ) -> Result<Vec<ChannelMessage>> {
            Ok(self.history.lock().unwrap().clone())
        }
    }

    const URL: &str = "https://discord.com/api/webhooks/1/t";

    fn settings(delete_guard: bool) -> Settings {
        Settings {
            webhook_url: URL.to_string(),
            enable_delete_guard: delete_guard,
            dedup_settle_ms: 0,
            ..Settings::default()
        }
    }

    fn core_with(
        settings: Settings,
        host: Arc<FakeHost>,
        dest: Arc<FakeDestination>,
        dir: &TempDir,
    ) -> LoggerCore {
        LoggerCore::with_destination(
            settings,
            dir.path().join("history.db"),
            host,
            Arc::new(NullSink),
            dest,
        )
        .unwrap()
    }

    fn incoming(id: &str, channel: &str, content: Option<&str>) -> IncomingMessage {
        IncomingMessage {
            id: id.to_string(),
            channel_id: channel.to_string(),
            content: content.map(str::to_string),
            author: Some(MessageAuthor {
                id: "a1".to_string(),
                username: "alice".to_string(),
                discriminator: "0".to_string(),
                is_bot: false,
            }),
            attachments: None,
        }
    }

    async fn wait_for_sent(dest: &FakeDestination, n: usize) -> Vec<OutboundRecord> {
        for _ in 0..100 {
            if dest.sent.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        dest.sent.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn edit_then_noop_then_delete_scenario() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::default());
        let dest = Arc::new(FakeDestination::default());
        let core = core_with(settings(false), host, dest.clone(), &dir);

        core.on_message_create(incoming("100", "9", Some("hello")));
        assert_eq!(core.snapshot("100").unwrap().content, "hello");

        core.on_message_update(incoming("100", "9", Some("goodbye")));
        let sent = wait_for_sent(&dest, 1).await;
        assert_eq!(sent.len(), 1);
        let embed = &sent[0].embeds[0];
        assert!(embed.title.contains("✏️"));
        assert_eq!(embed.fields[2].value, "hello");
        assert_eq!(embed.fields[3].value, "goodbye");
        assert_eq!(core.snapshot("100").unwrap().content, "goodbye");

        // Same content again: no change, nothing new sent.
        core.on_message_update(incoming("100", "9", Some("goodbye")));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(dest.sent.lock().unwrap().len(), 1);

        core.on_message_delete("9", "100");
        let sent = wait_for_sent(&dest, 2).await;
        assert_eq!(sent.len(), 2);
        let embed = &sent[1].embeds[0];
        assert!(embed.title.contains("🗑️"));
        assert_eq!(embed.fields[2].value, "goodbye");
        let (msg, ch) = parse_footer(&embed.footer.text).unwrap();
        assert_eq!((msg.as_str(), ch.as_str()), ("100", "9"));
        assert!(core.snapshot("100").is_none());
    }

    #[tokio::test]
    async fn bulk_delete_evaluates_each_id_against_the_channel() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::default());
        let dest = Arc::new(FakeDestination::default());
        let core = core_with(settings(false), host.clone(), dest, &dir);

        let ids: Vec<String> = ["1", "2", "3"].iter().map(|s| s.to_string()).collect();
        core.on_message_delete_bulk("9", &ids);

        // Nothing cached, so each id fell through to one host-store lookup.
        let lookups = host.lookups.lock().unwrap().clone();
        assert_eq!(lookups.len(), 3);
        assert!(lookups.iter().all(|(ch, _)| ch == "9"));
        assert_eq!(
            lookups.iter().map(|(_, id)| id.as_str()).collect::<Vec<_>>(),
            vec!["1", "2", "3"]
        );
    }

    #[tokio::test]
    async fn embed_only_update_is_suppressed_but_still_cached() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::default());
        let dest = Arc::new(FakeDestination::default());
        let core = core_with(settings(false), host, dest.clone(), &dir);

        core.on_message_create(incoming("1", "9", Some("text")));
        core.on_message_update(incoming("1", "9", None));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(dest.sent.lock().unwrap().is_empty());
        assert_eq!(core.snapshot("1").unwrap().content, "text");
    }

    #[tokio::test]
    async fn ignored_authors_produce_no_records() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost {
            user_id: Some("a1".to_string()),
            ..FakeHost::default()
        });
        let dest = Arc::new(FakeDestination::default());
        let core = core_with(
            Settings {
                ignore_self: true,
                ..settings(false)
            },
            host,
            dest.clone(),
            &dir,
        );

        core.on_message_create(incoming("1", "9", Some("mine")));
        core.on_message_update(incoming("1", "9", Some("edited")));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(dest.sent.lock().unwrap().is_empty());
        // The cache still tracks ignored messages.
        assert_eq!(core.snapshot("1").unwrap().content, "edited");
    }

    #[tokio::test]
    async fn delete_guard_suppresses_already_delivered_records() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::default());
        let dest = Arc::new(FakeDestination::default());
        {
            use synclog_protocol::{ChannelEmbed, ChannelEmbedFooter};
            dest.history.lock().unwrap().push(ChannelMessage {
                id: "1".to_string(),
                timestamp: None,
                embeds: vec![ChannelEmbed {
                    title: Some("💻 ✏️ Bearbeitet (PC)".to_string()),
                    fields: Vec::new(),
                    timestamp: None,
                    footer: Some(ChannelEmbedFooter {
                        text: Some("msgId:100|chId:9".to_string()),
                    }),
                }],
            });
        }
        let core = core_with(settings(true), host, dest.clone(), &dir);

        core.on_message_create(incoming("100", "9", Some("hello")));
        core.on_message_update(incoming("100", "9", Some("goodbye")));
        tokio::time::sleep(Duration::from_millis(50)).await;
        // The edit for "100" was already on the destination: suppressed.
        assert!(dest.sent.lock().unwrap().is_empty());

        // A different message is not suppressed.
        core.on_message_create(incoming("200", "9", Some("a")));
        core.on_message_update(incoming("200", "9", Some("b")));
        let sent = wait_for_sent(&dest, 1).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(
            parse_footer(&sent[0].embeds[0].footer.text).unwrap().0,
            "200"
        );
    }

    #[tokio::test]
    async fn local_history_accumulates_per_real_edit() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::default());
        let dest = Arc::new(FakeDestination::default());
        let core = core_with(settings(false), host, dest, &dir);

        core.on_message_create(incoming("1", "9", Some("v1")));
        core.on_message_update(incoming("1", "9", Some("v2")));
        core.on_message_update(incoming("1", "9", Some("v2")));
        core.on_message_update(incoming("1", "9", Some("v3")));

        let history = core.history_text("1").unwrap();
        assert!(history.contains("v1"));
        assert!(history.contains("v2"));
        assert_eq!(history.matches('\n').count(), 2);
    }

    #[tokio::test]
    async fn stop_clears_in_memory_state_but_not_history() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::default());
        let dest = Arc::new(FakeDestination::default());
        let core = core_with(settings(false), host, dest, &dir);

        core.on_message_create(incoming("1", "9", Some("v1")));
        core.on_message_update(incoming("1", "9", Some("v2")));
        core.stop();
        assert!(core.snapshot("1").is_none());
        assert!(core.history_text("1").is_some());
    }

    #[tokio::test]
    async fn event_worker_drains_and_stops() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::default());
        let dest = Arc::new(FakeDestination::default());
        let core = core_with(settings(false), host, dest.clone(), &dir);

        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        start_event_worker(core.clone(), rx, shutdown_rx);

        tx.send(MessageEvent::Created(incoming("1", "9", Some("a"))))
            .await
            .unwrap();
        tx.send(MessageEvent::Updated(incoming("1", "9", Some("b"))))
            .await
            .unwrap();
        let sent = wait_for_sent(&dest, 1).await;
        assert_eq!(sent.len(), 1);

        let _ = shutdown_tx.send(true);
        for _ in 0..100 {
            if core.snapshot("1").is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(core.snapshot("1").is_none());
    }
}
