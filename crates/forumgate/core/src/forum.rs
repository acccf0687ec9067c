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

//! Forum hierarchy
//!
//! Forums form a forest: every forum has at most one parent and an ordered
//! list of children. The parent graph is kept acyclic by every mutation.

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Forum identifier (the taxonomy term id of the forum container)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForumId(pub u64);

impl fmt::Display for ForumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ForumId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(ForumId)
            .map_err(|_| GatewayError::validation(format!("malformed forum id: {s:?}")))
    }
}

/// A single forum node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forum {
    pub id: ForumId,
    pub parent: Option<ForumId>,
    pub children: Vec<ForumId>,
}

/// The forum forest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumTree {
    forums: BTreeMap<ForumId, Forum>,
}

impl ForumTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from `(id, parent)` pairs, parents first
    pub fn from_edges(edges: impl IntoIterator<Item = (ForumId, Option<ForumId>)>) -> GatewayResult<Self> {
        let mut tree = Self::new();
        for (id, parent) in edges {
            tree.insert(id, parent)?;
        }
        Ok(tree)
    }

    pub fn contains(&self, id: ForumId) -> bool {
        self.forums.contains_key(&id)
    }

    pub fn get(&self, id: ForumId) -> Option<&Forum> {
        self.forums.get(&id)
    }

    pub fn len(&self) -> usize {
        self.forums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forums.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ForumId> + '_ {
        self.forums.keys().copied()
    }

    pub fn parent_of(&self, id: ForumId) -> GatewayResult<Option<ForumId>> {
        Ok(self.require(id)?.parent)
    }

    /// Add a forum below `parent`, or as a new root when `parent` is `None`
    pub fn insert(&mut self, id: ForumId, parent: Option<ForumId>) -> GatewayResult<()> {
        if self.forums.contains_key(&id) {
            return Err(GatewayError::validation(format!("forum {id} already exists")));
        }
        if let Some(parent_id) = parent {
            if parent_id == id {
                return Err(GatewayError::validation(format!("forum {id} cannot be its own parent")));
            }
            self.require_mut(parent_id)?.children.push(id);
        }
        self.forums.insert(id, Forum { id, parent, children: Vec::new() });
        Ok(())
    }

    /// Move `id` (with its whole subtree) below `new_parent`
    pub fn reparent(&mut self, id: ForumId, new_parent: Option<ForumId>) -> GatewayResult<()> {
        let old_parent = self.require(id)?.parent;
        if let Some(parent_id) = new_parent {
            self.require(parent_id)?;
            if parent_id == id || self.descendants(id)?.contains(&parent_id) {
                return Err(GatewayError::validation(format!("moving forum {id} below {parent_id} would create a cycle")));
            }
        }
        if old_parent == new_parent {
            return Ok(());
        }

        if let Some(old) = old_parent {
            self.require_mut(old)?.children.retain(|child| *child != id);
        }
        if let Some(parent_id) = new_parent {
            self.require_mut(parent_id)?.children.push(id);
        }
        self.require_mut(id)?.parent = new_parent;
        Ok(())
    }

    /// Remove a leaf forum
    pub fn remove(&mut self, id: ForumId) -> GatewayResult<Forum> {
        let forum = self.require(id)?;
        if !forum.children.is_empty() {
            return Err(GatewayError::validation(format!("forum {id} still has {} child forum(s)", forum.children.len())));
        }
        let parent = forum.parent;
        if let Some(parent_id) = parent {
            self.require_mut(parent_id)?.children.retain(|child| *child != id);
        }
        self.forums.remove(&id).ok_or_else(|| GatewayError::not_found(format!("forum {id} does not exist")))
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself
    pub fn ancestors(&self, id: ForumId) -> GatewayResult<Vec<ForumId>> {
        let mut ancestors = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.require(id)?.parent;
        while let Some(parent_id) = current {
            if !seen.insert(parent_id) {
                break;
            }
            ancestors.push(parent_id);
            current = self.forums.get(&parent_id).and_then(|forum| forum.parent);
        }
        Ok(ancestors)
    }

    /// Every forum below `id`, transitively, in pre-order
    pub fn descendants(&self, id: ForumId) -> GatewayResult<Vec<ForumId>> {
        let mut descendants = Vec::new();
        let mut stack: Vec<ForumId> = self.require(id)?.children.iter().rev().copied().collect();
        let mut seen = HashSet::new();
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            descendants.push(next);
            if let Some(forum) = self.forums.get(&next) {
                stack.extend(forum.children.iter().rev().copied());
            }
        }
        Ok(descendants)
    }

    /// `id` followed by all of its descendants
    pub fn subtree(&self, id: ForumId) -> GatewayResult<Vec<ForumId>> {
        let mut subtree = vec![id];
        subtree.extend(self.descendants(id)?);
        Ok(subtree)
    }

    /// The top-most ancestor of `id` (or `id` if it is a root)
    pub fn root_of(&self, id: ForumId) -> GatewayResult<ForumId> {
        Ok(self.ancestors(id)?.last().copied().unwrap_or(id))
    }

    fn require(&self, id: ForumId) -> GatewayResult<&Forum> {
        self.forums.get(&id).ok_or_else(|| GatewayError::not_found(format!("forum {id} does not exist")))
    }

    fn require_mut(&mut self, id: ForumId) -> GatewayResult<&mut Forum> {
        self.forums.get_mut(&id).ok_or_else(|| GatewayError::not_found(format!("forum {id} does not exist")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> ForumTree {
        // 1 -> 2 -> 4
        //   -> 3
        ForumTree::from_edges([(ForumId(1), None), (ForumId(2), Some(ForumId(1))), (ForumId(3), Some(ForumId(1))), (ForumId(4), Some(ForumId(2)))]).unwrap()
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let tree = sample_tree();
        assert_eq!(tree.ancestors(ForumId(4)).unwrap(), vec![ForumId(2), ForumId(1)]);
        assert!(tree.ancestors(ForumId(1)).unwrap().is_empty());
        assert_eq!(tree.root_of(ForumId(4)).unwrap(), ForumId(1));
    }

    #[test]
    fn test_descendants_are_transitive() {
        let tree = sample_tree();
        assert_eq!(tree.descendants(ForumId(1)).unwrap(), vec![ForumId(2), ForumId(4), ForumId(3)]);
        assert_eq!(tree.subtree(ForumId(2)).unwrap(), vec![ForumId(2), ForumId(4)]);
    }

    #[test]
    fn test_unknown_forum() {
        let tree = sample_tree();
        assert!(matches!(tree.ancestors(ForumId(99)), Err(GatewayError::NotFound { .. })));
    }

    #[test]
    fn test_insert_rejects_duplicates_and_unknown_parents() {
        let mut tree = sample_tree();
        assert!(matches!(tree.insert(ForumId(2), None), Err(GatewayError::Validation { .. })));
        assert!(matches!(tree.insert(ForumId(9), Some(ForumId(77))), Err(GatewayError::NotFound { .. })));
    }

    #[test]
    fn test_reparent_rejects_cycles() {
        let mut tree = sample_tree();
        assert!(matches!(tree.reparent(ForumId(1), Some(ForumId(4))), Err(GatewayError::Validation { .. })));

        tree.reparent(ForumId(4), Some(ForumId(3))).unwrap();
        assert_eq!(tree.parent_of(ForumId(4)).unwrap(), Some(ForumId(3)));
        assert_eq!(tree.get(ForumId(2)).unwrap().children, Vec::<ForumId>::new());
    }

    #[test]
    fn test_remove_only_leaves() {
        let mut tree = sample_tree();
        assert!(tree.remove(ForumId(2)).is_err());
        tree.remove(ForumId(4)).unwrap();
        assert!(!tree.contains(ForumId(4)));
        assert!(tree.get(ForumId(2)).unwrap().children.is_empty());
    }

    #[test]
    fn test_parse_forum_id() {
        assert_eq!("17".parse::<ForumId>().unwrap(), ForumId(17));
        assert!("abc".parse::<ForumId>().is_err());
    }
}
