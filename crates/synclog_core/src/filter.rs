/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SYNCLOG Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::config::Settings;
use crate::message_cache::MessageAuthor;

/// Suppression predicate for bot/self authored events. An absent author is
/// never ignored: deletions of messages we never observed carry no identity,
/// and whether they get logged is decided by recoverable content instead.
pub fn should_ignore(
    author: Option<&MessageAuthor>,
    settings: &Settings,
    current_user_id: Option<&str>,
) -> bool {
    let Some(author) = author else {
        return false;
    };
    if settings.ignore_bots && author.is_bot {
        return true;
    }
    if settings.ignore_self {
        if let Some(me) = current_user_id {
            if author.id == me {
                return true;
            }
        }
    }
    false
}
