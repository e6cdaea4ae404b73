/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SYNCLOG Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::Deserialize;

/// Runtime settings for the logger subsystem. Missing fields deserialize to
/// the documented defaults, so components downstream always see concrete
/// values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Destination webhook URL. Empty disables all outbound delivery.
    pub webhook_url: String,
    pub ignore_self: bool,
    pub ignore_bots: bool,
    /// Accumulate per-message edit history in the persistent store.
    pub enable_local_history: bool,
    /// Query the destination for already-delivered records before sending.
    pub enable_delete_guard: bool,

    pub cache_capacity: usize,
    pub history_max_entries: u32,
    pub history_trim_to: u32,

    /// Settle time before the dedup read, so duplicate event storms collapse
    /// onto one detected change first.
    pub dedup_settle_ms: u64,
    pub dedup_scan_limit: u32,

    pub reconstruct_page_size: u32,
    pub reconstruct_max_pages: u32,

    /// Informational origin marker rendered into record titles.
    pub origin_emoji: String,
    pub origin_label: String,

    /// Base URL of the destination's authenticated read API.
    pub api_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            ignore_self: false,
            ignore_bots: false,
            enable_local_history: true,
            enable_delete_guard: true,
            cache_capacity: 500,
            history_max_entries: 500,
            history_trim_to: 450,
            dedup_settle_ms: 2000,
            dedup_scan_limit: 25,
            reconstruct_page_size: 100,
            reconstruct_max_pages: 5,
            origin_emoji: "💻".to_string(),
            origin_label: "PC".to_string(),
            api_base_url: "https://discord.com/api/v9".to_string(),
        }
    }
}

impl Settings {
    pub fn webhook_url_valid(&self) -> bool {
        webhook_url_valid(&self.webhook_url)
    }
}

/// A destination URL must look like a webhook endpoint before any I/O is
/// attempted; anything else short-circuits to a silent no-op.
pub fn webhook_url_valid(url: &str) -> bool {
    let url = url.trim();
    url.starts_with("http") && url.contains("api/webhooks/")
}
