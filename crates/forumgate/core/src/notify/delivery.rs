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

//! Delivery channels and retry policy

use crate::access::grants::UserId;
use crate::config::DispatchConfig;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// External channel a rendered digest is handed to
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Deliver `message` to `recipient`. A `Delivery` error is retried.
    async fn deliver(&self, recipient: UserId, message: &str) -> GatewayResult<()>;
}

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.initial_backoff_ms), Duration::from_millis(config.max_backoff_ms))
    }

    /// Wait before retrying after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

/// Delivers by writing the message to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

#[async_trait]
impl DeliveryChannel for LogChannel {
    async fn deliver(&self, recipient: UserId, message: &str) -> GatewayResult<()> {
        info!(recipient = %recipient, message = %message, "Notification delivered");
        Ok(())
    }
}

#[derive(Serialize)]
struct OutboxLine<'a> {
    recipient: UserId,
    message: &'a str,
    delivered_at: chrono::DateTime<Utc>,
}

/// Appends one JSON line per delivered message to a file
#[derive(Debug, Clone)]
pub struct OutboxChannel {
    path: PathBuf,
}

impl OutboxChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DeliveryChannel for OutboxChannel {
    async fn deliver(&self, recipient: UserId, message: &str) -> GatewayResult<()> {
        let mut line = serde_json::to_vec(&OutboxLine {
            recipient,
            message,
            delivered_at: Utc::now(),
        })?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| GatewayError::delivery(format!("cannot open outbox {}: {e}", self.path.display())))?;
        file.write_all(&line).await.map_err(|e| GatewayError::delivery(format!("cannot write outbox {}: {e}", self.path.display())))?;
        file.flush().await.map_err(|e| GatewayError::delivery(format!("cannot flush outbox {}: {e}", self.path.display())))?;
        Ok(())
    }
}
