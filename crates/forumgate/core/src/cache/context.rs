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

//! Cache keys for request-dependent renderings

use crate::access::grants::UserId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Location value used when a request has no location
pub const EVERYWHERE: &str = "--everywhere--";

/// The request dimensions a rendering may vary by
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub view_mode: String,
    pub langcode: String,
    pub location: Option<String>,
    pub path: Option<String>,
    pub user: Option<UserId>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(view_mode: impl Into<String>, langcode: impl Into<String>) -> Self {
        Self {
            view_mode: view_mode.into(),
            langcode: langcode.into(),
            ..Self::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Derives cache keys from `{view_mode, langcode, location}` only
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheKeyDeriver;

impl CacheKeyDeriver {
    pub fn derive_key(&self, context: &RequestContext) -> String {
        let location = context.location.as_deref().map(str::trim).filter(|location| !location.is_empty()).unwrap_or(EVERYWHERE);
        format!("{}:{}:{}", escape(&context.view_mode), escape(&context.langcode), escape(location))
    }
}

// Keeps `a:b` + `c` and `a` + `b:c` from colliding
fn escape(part: &str) -> String {
    part.replace('\\', "\\\\").replace(':', "\\:")
}
