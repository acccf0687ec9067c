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

pub mod access;
pub mod cache;
pub mod notify;

use crate::state::{GatewayState, state_path};
use anyhow::Result;
use forumgate_core::access::StaticMembership;
use forumgate_core::notify::{OutboxChannel, SourceRegistryBuilder};
use forumgate_core::{Gateway, GatewayConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const OUTBOX_FILE: &str = "outbox.jsonl";

pub struct CommandContext {
    pub gateway: Gateway,
    state_path: PathBuf,
}

impl CommandContext {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let state_path = state_path(&config.data_dir);
        let state = GatewayState::load(&state_path)?;
        let channel = Arc::new(OutboxChannel::new(config.data_dir.join(OUTBOX_FILE)));

        let gateway = Gateway::new(
            config,
            state.tree,
            state.records,
            SourceRegistryBuilder::with_defaults().build(),
            Arc::new(StaticMembership::new()),
            channel,
        )?;
        gateway.aggregator.restore(state.pending)?;

        Ok(Self { gateway, state_path })
    }

    /// Write the current tree, records and pending events back to the data directory
    pub fn persist(&self) -> Result<()> {
        let (tree, records) = self.gateway.store.export();
        let state = GatewayState {
            tree,
            records,
            pending: self.gateway.aggregator.export(),
        };
        state.save(&self.state_path)?;
        debug!(path = %self.state_path.display(), pending = state.pending.len(), "Gateway state saved");
        Ok(())
    }
}
