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

//! Notification dispatch
//!
//! Each tick drains every pending (source, recipient) pair, drops events the
//! recipient may no longer see, renders the rest and hands the digest to the
//! delivery channel. Pairs are processed concurrently and independently:
//! retries run on their own tasks, so a failing recipient never holds up
//! another one.

use crate::access::grants::{Action, UserId};
use crate::access::resolver::AccessResolver;
use crate::config::DispatchConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::forum::ForumId;
use crate::notify::aggregator::{NotificationAggregator, NotificationDigest, PendingNotificationEvent};
use crate::notify::delivery::{DeliveryChannel, RetryPolicy};
use futures::stream::{self, StreamExt};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Outcome counts of one dispatch run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Digests accepted by the delivery channel
    pub delivered: usize,
    /// Digests dropped after exhausting retries or on a permanent error
    pub dropped: usize,
    /// Events discarded because the recipient lost access
    pub filtered_events: usize,
    /// Pairs that had nothing left to deliver
    pub skipped: usize,
}

enum PairOutcome {
    Delivered { filtered: usize },
    Dropped { filtered: usize },
    Skipped { filtered: usize },
    /// First attempt failed with a retryable error
    Retrying { filtered: usize, digest: NotificationDigest },
}

/// Periodic or triggered entry point for notification delivery
pub struct NotificationDispatcher {
    aggregator: Arc<NotificationAggregator>,
    resolver: Arc<AccessResolver>,
    channel: Arc<dyn DeliveryChannel>,
    config: DispatchConfig,
    retry: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(aggregator: Arc<NotificationAggregator>, resolver: Arc<AccessResolver>, channel: Arc<dyn DeliveryChannel>, config: DispatchConfig) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            aggregator,
            resolver,
            channel,
            config,
            retry,
        }
    }

    /// Dispatch everything pending; returns the number of digests delivered
    pub async fn dispatch_due(&self) -> usize {
        self.dispatch_report().await.delivered
    }

    /// Dispatch everything pending and report what happened.
    ///
    /// First attempts share `max_concurrency` slots. Digests whose first
    /// attempt fails are retried on their own tasks outside those slots, so
    /// a failing recipient never delays the first attempt of another one.
    pub async fn dispatch_report(&self) -> DispatchReport {
        let pairs = self.aggregator.pending_pairs();
        if pairs.is_empty() {
            return DispatchReport::default();
        }
        debug!(pairs = pairs.len(), "Dispatching pending notifications");

        let mut report = DispatchReport::default();
        let mut retries = JoinSet::new();
        let mut first_attempts = stream::iter(pairs)
            .map(|(source_id, recipient)| async move { self.dispatch_pair(&source_id, recipient).await })
            .buffer_unordered(self.config.max_concurrency.max(1));

        while let Some(outcome) = first_attempts.next().await {
            match outcome {
                PairOutcome::Delivered { filtered } => {
                    report.delivered += 1;
                    report.filtered_events += filtered;
                }
                PairOutcome::Dropped { filtered } => {
                    report.dropped += 1;
                    report.filtered_events += filtered;
                }
                PairOutcome::Skipped { filtered } => {
                    report.skipped += 1;
                    report.filtered_events += filtered;
                }
                PairOutcome::Retrying { filtered, digest } => {
                    report.filtered_events += filtered;
                    retries.spawn(retry_delivery(self.channel.clone(), self.retry, self.config.delivery_timeout(), digest));
                }
            }
        }
        drop(first_attempts);

        while let Some(joined) = retries.join_next().await {
            match joined {
                Ok(true) => report.delivered += 1,
                Ok(false) => report.dropped += 1,
                Err(e) => {
                    error!(error = %e, "Delivery retry task failed");
                    counter!("forumgate_digests_dropped", 1);
                    report.dropped += 1;
                }
            }
        }

        info!(
            delivered = report.delivered,
            dropped = report.dropped,
            filtered_events = report.filtered_events,
            skipped = report.skipped,
            "Notification dispatch completed"
        );
        report
    }

    /// Run [`dispatch_due`](Self::dispatch_due) on the configured interval until aborted
    pub fn spawn_periodic(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval());
            loop {
                interval.tick().await;
                let delivered = self.dispatch_due().await;
                debug!(delivered, "Periodic dispatch tick");
            }
        })
    }

    async fn dispatch_pair(&self, source_id: &str, recipient: UserId) -> PairOutcome {
        let events = self.aggregator.drain(recipient, source_id);
        let before = events.len();
        let visible: Vec<PendingNotificationEvent> = events.into_iter().filter(|event| self.still_visible(recipient, event)).collect();
        let filtered = before - visible.len();

        let digest = match self.aggregator.render_digest(recipient, source_id, &visible) {
            Ok(Some(digest)) => digest,
            Ok(None) => return PairOutcome::Skipped { filtered },
            Err(e) => {
                error!(source = %source_id, recipient = %recipient, error = %e, "Cannot render digest");
                return PairOutcome::Dropped { filtered };
            }
        };

        match deliver_once(self.channel.as_ref(), self.config.delivery_timeout(), &digest).await {
            Ok(()) => {
                debug!(recipient = %digest.recipient, source = %digest.source_id, attempt = 1, "Digest delivered");
                counter!("forumgate_digests_delivered", 1);
                PairOutcome::Delivered { filtered }
            }
            Err(e) if e.is_retryable() && self.retry.max_attempts > 1 => {
                warn!(recipient = %digest.recipient, source = %digest.source_id, attempt = 1, error = %e, "Delivery failed, retrying");
                PairOutcome::Retrying { filtered, digest }
            }
            Err(e) => {
                error!(recipient = %digest.recipient, source = %digest.source_id, attempt = 1, error = %e, entries = digest.entries.len(), "Digest undelivered, dropping");
                counter!("forumgate_digests_dropped", 1);
                PairOutcome::Dropped { filtered }
            }
        }
    }

    /// Events naming a forum are kept only while the recipient can still view it
    fn still_visible(&self, recipient: UserId, event: &PendingNotificationEvent) -> bool {
        let Some(raw) = event.payload.get(&self.config.access_field) else {
            return true;
        };
        let forum_id = match raw.parse::<ForumId>() {
            Ok(forum_id) => forum_id,
            Err(e) => {
                warn!(recipient = %recipient, value = %raw, error = %e, "Dropping event with malformed forum reference");
                return false;
            }
        };
        match self.resolver.can_access(recipient, forum_id, Action::View) {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(recipient = %recipient, forum_id = %forum_id, error = %e, "Dropping event for unresolvable forum");
                false
            }
        }
    }
}

async fn deliver_once(channel: &dyn DeliveryChannel, timeout: Duration, digest: &NotificationDigest) -> GatewayResult<()> {
    match tokio::time::timeout(timeout, channel.deliver(digest.recipient, &digest.message)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::delivery(format!("delivery timed out after {timeout:?}"))),
    }
}

/// Attempts 2..=max_attempts of a digest whose first attempt failed
async fn retry_delivery(channel: Arc<dyn DeliveryChannel>, retry: RetryPolicy, timeout: Duration, digest: NotificationDigest) -> bool {
    for attempt in 2..=retry.max_attempts {
        counter!("forumgate_delivery_retries", 1);
        tokio::time::sleep(retry.backoff(attempt - 1)).await;

        match deliver_once(channel.as_ref(), timeout, &digest).await {
            Ok(()) => {
                debug!(recipient = %digest.recipient, source = %digest.source_id, attempt, "Digest delivered");
                counter!("forumgate_digests_delivered", 1);
                return true;
            }
            Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                warn!(recipient = %digest.recipient, source = %digest.source_id, attempt, error = %e, "Delivery failed, retrying");
            }
            Err(e) => {
                error!(recipient = %digest.recipient, source = %digest.source_id, attempt, error = %e, entries = digest.entries.len(), "Digest undelivered, dropping");
                break;
            }
        }
    }
    counter!("forumgate_digests_dropped", 1);
    false
}
