// Forumgate
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Pending notification events and digest building

use crate::access::grants::UserId;
use crate::error::GatewayResult;
use crate::notify::source::SourceRegistry;
use crate::notify::template;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Key/value payload of an activity event
pub type Payload = BTreeMap<String, String>;

/// An activity worth notifying, waiting for the next digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNotificationEvent {
    pub source_id: String,
    pub recipient: UserId,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    /// Insertion order, breaks timestamp ties
    pub sequence: u64,
}

/// One rendered message for a recipient and source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDigest {
    pub recipient: UserId,
    pub source_id: String,
    pub entries: Vec<Payload>,
    pub message: String,
}

type PairKey = (String, UserId);

/// Queues events per (source, recipient) and drains them into digests
#[derive(Debug)]
pub struct NotificationAggregator {
    registry: Arc<SourceRegistry>,
    pending: DashMap<PairKey, Vec<PendingNotificationEvent>>,
    sequence: AtomicU64,
}

impl NotificationAggregator {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self {
            registry,
            pending: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Queue an event. Duplicates are kept and become separate list entries.
    pub fn enqueue(&self, source_id: &str, recipient: UserId, payload: Payload) -> GatewayResult<()> {
        self.registry.get(source_id)?;
        let event = PendingNotificationEvent {
            source_id: source_id.to_string(),
            recipient,
            payload,
            created_at: Utc::now(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
        };
        self.push(event);
        debug!(source = %source_id, recipient = %recipient, "Notification event queued");
        Ok(())
    }

    /// Re-queue previously exported events, keeping their timestamps
    pub fn restore(&self, events: impl IntoIterator<Item = PendingNotificationEvent>) -> GatewayResult<()> {
        for mut event in events {
            self.registry.get(&event.source_id)?;
            event.sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
            self.push(event);
        }
        Ok(())
    }

    fn push(&self, event: PendingNotificationEvent) {
        // The shard lock makes this exclusive with `drain` for the same pair
        self.pending.entry((event.source_id.clone(), event.recipient)).or_default().push(event);
    }

    /// Atomically take every pending event of the pair, oldest first
    pub fn drain(&self, recipient: UserId, source_id: &str) -> Vec<PendingNotificationEvent> {
        let mut events = self.pending.remove(&(source_id.to_string(), recipient)).map(|(_, events)| events).unwrap_or_default();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.sequence.cmp(&b.sequence)));
        events
    }

    /// Drain the pair and render it; `None` when nothing was pending
    pub fn build_digest(&self, recipient: UserId, source_id: &str) -> GatewayResult<Option<NotificationDigest>> {
        self.registry.get(source_id)?;
        let events = self.drain(recipient, source_id);
        self.render_digest(recipient, source_id, &events)
    }

    /// Render already drained events; `None` when `events` is empty
    pub fn render_digest(&self, recipient: UserId, source_id: &str, events: &[PendingNotificationEvent]) -> GatewayResult<Option<NotificationDigest>> {
        let descriptor = self.registry.get(source_id)?;
        if events.is_empty() {
            return Ok(None);
        }

        let payloads: Vec<&Payload> = events.iter().map(|event| &event.payload).collect();
        let message = template::render(descriptor, &payloads);
        Ok(Some(NotificationDigest {
            recipient,
            source_id: source_id.to_string(),
            entries: events.iter().map(|event| event.payload.clone()).collect(),
            message,
        }))
    }

    /// Every (source, recipient) pair with at least one pending event
    pub fn pending_pairs(&self) -> Vec<(String, UserId)> {
        let mut pairs: Vec<(String, UserId)> = self.pending.iter().filter(|entry| !entry.value().is_empty()).map(|entry| entry.key().clone()).collect();
        pairs.sort();
        pairs
    }

    pub fn pending_count(&self, recipient: UserId, source_id: &str) -> usize {
        self.pending.get(&(source_id.to_string(), recipient)).map(|events| events.len()).unwrap_or(0)
    }

    /// Every pending event, for persistence
    pub fn export(&self) -> Vec<PendingNotificationEvent> {
        let mut events: Vec<PendingNotificationEvent> = self.pending.iter().flat_map(|entry| entry.value().clone()).collect();
        events.sort_by_key(|event| event.sequence);
        events
    }
}
