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

//! Per-forum access records

use crate::access::grants::{Category, GrantSet};
use crate::error::{GatewayError, GatewayResult};
use crate::forum::ForumId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Whether a category is configured on the forum itself or taken from an ancestor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Inheritance {
    Custom,
    Inherited,
}

impl fmt::Display for Inheritance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inheritance::Custom => f.write_str("custom"),
            Inheritance::Inherited => f.write_str("inherited"),
        }
    }
}

impl FromStr for Inheritance {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "custom" => Ok(Inheritance::Custom),
            "inherited" => Ok(Inheritance::Inherited),
            other => Err(GatewayError::validation(format!("unknown inheritance mode: {other:?}"))),
        }
    }
}

/// Stored configuration of one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAccess {
    pub mode: Inheritance,
    #[serde(default)]
    pub grants: GrantSet,
}

impl CategoryAccess {
    pub fn custom(grants: GrantSet) -> Self {
        Self { mode: Inheritance::Custom, grants }
    }

    pub fn inherited() -> Self {
        Self {
            mode: Inheritance::Inherited,
            grants: GrantSet::new(),
        }
    }
}

/// Access configuration of one forum. Categories without an entry are inherited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub forum_id: ForumId,
    #[serde(default)]
    pub categories: BTreeMap<Category, CategoryAccess>,
}

impl AccessRecord {
    /// A record inheriting every category
    pub fn new(forum_id: ForumId) -> Self {
        Self {
            forum_id,
            categories: BTreeMap::new(),
        }
    }

    pub fn with_custom(mut self, category: Category, grants: GrantSet) -> Self {
        self.categories.insert(category, CategoryAccess::custom(grants));
        self
    }

    pub fn with_inherited(mut self, category: Category) -> Self {
        self.categories.insert(category, CategoryAccess::inherited());
        self
    }

    pub fn set(&mut self, category: Category, access: CategoryAccess) {
        self.categories.insert(category, access);
    }

    pub fn mode(&self, category: Category) -> Inheritance {
        self.categories.get(&category).map(|access| access.mode).unwrap_or(Inheritance::Inherited)
    }

    pub fn is_custom(&self, category: Category) -> bool {
        self.mode(category) == Inheritance::Custom
    }

    /// Locally stored grants, only when the category is custom
    pub fn custom_grants(&self, category: Category) -> Option<&GrantSet> {
        self.categories.get(&category).filter(|access| access.mode == Inheritance::Custom).map(|access| &access.grants)
    }

    pub fn has_any_custom(&self) -> bool {
        self.categories.values().any(|access| access.mode == Inheritance::Custom)
    }

    /// Reject inherited categories that still carry grants
    pub fn validate(&self) -> GatewayResult<()> {
        for (category, access) in &self.categories {
            if access.mode == Inheritance::Inherited && !access.grants.is_empty() {
                return Err(GatewayError::validation(format!(
                    "forum {}: category {category} is inherited but carries custom grants {}",
                    self.forum_id, access.grants
                )));
            }
        }
        Ok(())
    }
}
