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

//! Permission categories, grantees and grant sets

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// User identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(UserId).map_err(|_| GatewayError::validation(format!("malformed user id: {s:?}")))
    }
}

/// Role category a grant set is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    View,
    Members,
    Moderators,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::View, Category::Members, Category::Moderators];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::View => "view",
            Category::Members => "members",
            Category::Moderators => "moderators",
        }
    }

    /// This category and every stronger one; a moderator may also post and view
    pub fn and_stronger(&self) -> &'static [Category] {
        match self {
            Category::View => &[Category::View, Category::Members, Category::Moderators],
            Category::Members => &[Category::Members, Category::Moderators],
            Category::Moderators => &[Category::Moderators],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(Category::View),
            "members" => Ok(Category::Members),
            "moderators" => Ok(Category::Moderators),
            other => Err(GatewayError::validation(format!("unknown category: {other:?}"))),
        }
    }
}

/// Something a user can be asked to do in a forum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Post,
    Moderate,
}

impl Action {
    pub fn category(&self) -> Category {
        match self {
            Action::View => Category::View,
            Action::Post => Category::Members,
            Action::Moderate => Category::Moderators,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::View => "view",
            Action::Post => "post",
            Action::Moderate => "moderate",
        };
        f.write_str(name)
    }
}

impl FromStr for Action {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(Action::View),
            "post" => Ok(Action::Post),
            "moderate" => Ok(Action::Moderate),
            other => Err(GatewayError::validation(format!("unknown action: {other:?}"))),
        }
    }
}

/// A principal a category can be granted to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Grantee {
    Role(String),
    User(UserId),
}

impl Grantee {
    pub fn role(name: impl Into<String>) -> Self {
        Grantee::Role(name.into())
    }
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grantee::Role(name) => write!(f, "role:{name}"),
            Grantee::User(id) => write!(f, "user:{id}"),
        }
    }
}

impl FromStr for Grantee {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once(':') {
            Some(("role", name)) if !name.is_empty() => Ok(Grantee::Role(name.to_string())),
            Some(("user", id)) => Ok(Grantee::User(id.parse()?)),
            _ => Err(GatewayError::validation(format!("malformed grantee {s:?}, expected role:<name> or user:<id>"))),
        }
    }
}

impl TryFrom<String> for Grantee {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Grantee> for String {
    fn from(value: Grantee) -> Self {
        value.to_string()
    }
}

/// An ordered set of grantees
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantSet(BTreeSet<Grantee>);

impl GrantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma separated list such as `role:editor,user:7`
    pub fn parse_list(list: &str) -> GatewayResult<Self> {
        list.split(',').map(str::trim).filter(|item| !item.is_empty()).map(Grantee::from_str).collect()
    }

    pub fn insert(&mut self, grantee: Grantee) -> bool {
        self.0.insert(grantee)
    }

    pub fn contains(&self, grantee: &Grantee) -> bool {
        self.0.contains(grantee)
    }

    pub fn intersects<'a>(&self, mut grantees: impl Iterator<Item = &'a Grantee>) -> bool {
        grantees.any(|grantee| self.0.contains(grantee))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Grantee> {
        self.0.iter()
    }
}

impl FromIterator<Grantee> for GrantSet {
    fn from_iter<T: IntoIterator<Item = Grantee>>(iter: T) -> Self {
        GrantSet(iter.into_iter().collect())
    }
}

impl fmt::Display for GrantSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{{{}}}", items.join(", "))
    }
}
