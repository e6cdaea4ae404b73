/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SYNCLOG Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::sync::Arc;

use synclog_protocol::OutboundRecord;
use tracing::{info, warn};

use crate::config;
use crate::destination::Destination;

/// Posts records to the destination. Fire-and-forget from the caller's
/// perspective: the outcome is logged, failures are never retried, and
/// concurrent sends carry no ordering guarantee (each record is
/// self-contained and identifiable via its footer).
pub struct Transmitter {
    destination: Arc<dyn Destination>,
}

impl Transmitter {
    pub fn new(destination: Arc<dyn Destination>) -> Self {
        Self { destination }
    }

    pub async fn send(&self, webhook_url: &str, record: &OutboundRecord) {
        if !config::webhook_url_valid(webhook_url) {
            return;
        }
        match self
            .destination
            .execute_webhook(webhook_url.trim(), record)
            .await
        {
            Ok(()) => info!("record delivered to webhook"),
            Err(e) => warn!("webhook delivery failed: {e:#}"),
        }
    }
}
