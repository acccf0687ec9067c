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

//! Forum access and notification gateway
//!
//! Resolves inherited forum permissions over a forum hierarchy, derives
//! cache keys for request-dependent renderings, and aggregates activity
//! events into per-recipient notification digests that are delivered with
//! bounded retries.

pub mod access;
pub mod activity;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod forum;
pub mod gateway;
pub mod logging;
pub mod notify;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use forum::{Forum, ForumId, ForumTree};
pub use gateway::Gateway;
