/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SYNCLOG Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Durable per-message edit history. History text is append-only within a
/// process lifetime; it only shrinks via whole-store pruning.
#[derive(Clone)]
pub struct HistoryDb {
    path: PathBuf,
}

impl HistoryDb {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let conn =
            Connection::open(&path).with_context(|| format!("open db: {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS message_history (
              message_id TEXT PRIMARY KEY,
              history_text TEXT NOT NULL,
              updated_at_ms INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self { path })
    }

    pub fn get(&self, message_id: &str) -> Result<Option<String>> {
        let conn = Connection::open(&self.path)?;
        let text: Option<String> = conn
            .query_row(
                "SELECT history_text FROM message_history WHERE message_id=?1",
                params![message_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(text)
    }

    /// Appends one formatted block to the message's accumulated history.
    pub fn append_block(&self, message_id: &str, block: &str, now_ms: i64) -> Result<()> {
        let message_id = message_id.trim();
        if message_id.is_empty() || block.is_empty() {
            return Ok(());
        }
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "INSERT INTO message_history(message_id, history_text, updated_at_ms)
             VALUES(?1, ?2, ?3)
             ON CONFLICT(message_id) DO UPDATE SET
               history_text = history_text || ?2,
               updated_at_ms = ?3",
            params![message_id, block, now_ms],
        )?;
        Ok(())
    }

    /// Writes the given history only when no local history exists yet.
    /// Local state always wins over reconstructed remote state; returns
    /// whether the write happened.
    pub fn set_if_empty(&self, message_id: &str, history_text: &str, now_ms: i64) -> Result<bool> {
        let message_id = message_id.trim();
        if message_id.is_empty() || history_text.is_empty() {
            return Ok(false);
        }
        let conn = Connection::open(&self.path)?;
        let changed = conn.execute(
            "INSERT INTO message_history(message_id, history_text, updated_at_ms)
             VALUES(?1, ?2, ?3)
             ON CONFLICT(message_id) DO UPDATE SET
               history_text = ?2,
               updated_at_ms = ?3
             WHERE message_history.history_text = ''",
            params![message_id, history_text, now_ms],
        )?;
        Ok(changed > 0)
    }

    pub fn count(&self) -> Result<u32> {
        let conn = Connection::open(&self.path)?;
        let n: u32 = conn.query_row("SELECT COUNT(*) FROM message_history", [], |r| r.get(0))?;
        Ok(n)
    }

    /// Trims the store down to `floor` entries once it exceeds
    /// `max_entries`, dropping the smallest message identities first.
    /// Ordering is length-then-lexicographic, which sorts non-negative
    /// decimal identifiers numerically across digit-length epochs.
    pub fn prune_to_floor(&self, max_entries: u32, floor: u32) -> Result<u32> {
        let conn = Connection::open(&self.path)?;
        let count: u32 =
            conn.query_row("SELECT COUNT(*) FROM message_history", [], |r| r.get(0))?;
        if count <= max_entries {
            return Ok(0);
        }
        let excess = count.saturating_sub(floor.min(max_entries));
        let deleted = conn.execute(
            "DELETE FROM message_history WHERE message_id IN (
               SELECT message_id FROM message_history
               ORDER BY LENGTH(message_id), message_id
               LIMIT ?1
             )",
            params![excess],
        )?;
        Ok(deleted as u32)
    }
}
