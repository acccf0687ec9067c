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

//! Notification source descriptors and their registry

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Source of private message notifications
pub const PRIVATE_MESSAGE_SOURCE: &str = "private_message";

/// Source of forum reply notifications
pub const FORUM_REPLY_SOURCE: &str = "forum_reply";

/// Describes one kind of notification and how its digest is rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSourceDescriptor {
    pub id: String,
    pub label: String,
    /// Token prefix identifying the source in templates, e.g. `private_message`
    pub token: String,
    pub category: String,
    /// Message template with `{token}` placeholders
    pub template: String,
    /// Placeholder name to human description
    pub message_tokens: BTreeMap<String, String>,
    /// Placeholder name to the payload key that supplies each list item.
    /// A token without an entry reads the payload key of the same name.
    #[serde(default)]
    pub token_fields: BTreeMap<String, String>,
}

impl NotificationSourceDescriptor {
    pub fn new(id: impl Into<String>, label: impl Into<String>, template: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            token: id.clone(),
            id,
            label: label.into(),
            category: "notification".to_string(),
            template: template.into(),
            message_tokens: BTreeMap::new(),
            token_fields: BTreeMap::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>, description: impl Into<String>) -> Self {
        self.message_tokens.insert(token.into(), description.into());
        self
    }

    pub fn with_token_field(mut self, token: impl Into<String>, field: impl Into<String>) -> Self {
        self.token_fields.insert(token.into(), field.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Payload key supplying the items of `token`
    pub fn field_for<'a>(&'a self, token: &'a str) -> &'a str {
        self.token_fields.get(token).map(String::as_str).unwrap_or(token)
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if self.id.trim().is_empty() {
            return Err(GatewayError::validation("notification source id must not be empty"));
        }
        if self.message_tokens.keys().any(|token| token.trim().is_empty()) {
            return Err(GatewayError::validation(format!("source {}: message tokens must not be empty", self.id)));
        }
        if let Some(token) = self.token_fields.keys().find(|token| !self.message_tokens.contains_key(*token)) {
            return Err(GatewayError::validation(format!("source {}: field mapping for undeclared token {token:?}", self.id)));
        }
        Ok(())
    }

    /// New private messages for a recipient
    pub fn private_message() -> Self {
        Self::new(PRIVATE_MESSAGE_SOURCE, "Private message", "You have new messages: {message-list}")
            .with_token("message-list", "List of links to the new private messages")
            .with_token_field("message-list", "url")
    }

    /// New replies in a followed forum topic
    pub fn forum_reply() -> Self {
        Self::new(FORUM_REPLY_SOURCE, "Forum reply", "There are new replies in topics you follow: {reply-list}")
            .with_token("reply-list", "List of links to the new replies")
            .with_token_field("reply-list", "url")
    }
}

/// Collects descriptors at startup
#[derive(Debug, Default)]
pub struct SourceRegistryBuilder {
    sources: BTreeMap<String, NotificationSourceDescriptor>,
}

impl SourceRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preloaded with the private message and forum reply sources
    pub fn with_defaults() -> Self {
        let mut builder = Self::new();
        for descriptor in [NotificationSourceDescriptor::private_message(), NotificationSourceDescriptor::forum_reply()] {
            builder.sources.insert(descriptor.id.clone(), descriptor);
        }
        builder
    }

    pub fn register(&mut self, descriptor: NotificationSourceDescriptor) -> GatewayResult<&mut Self> {
        descriptor.validate()?;
        if self.sources.contains_key(&descriptor.id) {
            return Err(GatewayError::validation(format!("notification source {} is already registered", descriptor.id)));
        }
        self.sources.insert(descriptor.id.clone(), descriptor);
        Ok(self)
    }

    pub fn build(self) -> SourceRegistry {
        SourceRegistry { sources: Arc::new(self.sources) }
    }
}

/// Immutable set of notification sources
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Arc<BTreeMap<String, NotificationSourceDescriptor>>,
}

impl SourceRegistry {
    pub fn get(&self, id: &str) -> GatewayResult<&NotificationSourceDescriptor> {
        self.sources.get(id).ok_or_else(|| GatewayError::not_found(format!("notification source {id} is not registered")))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
