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

use forumgate_core::access::{AccessRecord, AccessRecordStore, AccessResolver, Action, Category, GrantSet, Grantee, StaticMembership, UserId};
use forumgate_core::config::AccessConfig;
use forumgate_core::{ForumId, ForumTree};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// `(parent index, custom view grant)` per node; a parent always precedes its child
fn forest() -> impl Strategy<Value = Vec<(Option<usize>, bool)>> {
    prop::collection::vec((any::<prop::sample::Index>(), any::<bool>(), any::<bool>()), 1..40).prop_map(|nodes| {
        nodes
            .into_iter()
            .enumerate()
            .map(|(i, (index, has_parent, custom))| {
                let parent = if i > 0 && has_parent { Some(index.index(i)) } else { None };
                (parent, custom)
            })
            .collect()
    })
}

fn forum(i: usize) -> ForumId {
    ForumId(i as u64 + 1)
}

fn grants_for(i: usize) -> GrantSet {
    [Grantee::role(format!("group{i}"))].into_iter().collect()
}

fn resolver_for(nodes: &[(Option<usize>, bool)]) -> AccessResolver {
    let tree = ForumTree::from_edges(nodes.iter().enumerate().map(|(i, (parent, _))| (forum(i), parent.map(forum)))).unwrap();
    let records = nodes
        .iter()
        .enumerate()
        .filter(|(_, (_, custom))| *custom)
        .map(|(i, _)| AccessRecord::new(forum(i)).with_custom(Category::View, grants_for(i)))
        .collect();
    let store = Arc::new(AccessRecordStore::from_parts(tree, records, Duration::from_millis(200)).unwrap());
    AccessResolver::new(store, Arc::new(StaticMembership::new()), AccessConfig::default())
}

fn editorial_tree() -> AccessResolver {
    // root(1) -> A(2) -> B(3)
    let tree = ForumTree::from_edges([(ForumId(1), None), (ForumId(2), Some(ForumId(1))), (ForumId(3), Some(ForumId(2)))]).unwrap();
    let store = Arc::new(AccessRecordStore::new(tree, Duration::from_millis(200)));
    let resolver = AccessResolver::new(
        store.clone(),
        Arc::new(StaticMembership::new().with_grantees(UserId(7), [Grantee::role("editor")])),
        AccessConfig::default(),
    );

    store.put(AccessRecord::new(ForumId(2)).with_custom(Category::View, GrantSet::parse_list("role:editor").unwrap())).unwrap();
    store.put(AccessRecord::new(ForumId(3)).with_inherited(Category::View)).unwrap();
    resolver
}

proptest! {
    #[test]
    fn inherited_view_matches_nearest_custom_ancestor(nodes in forest()) {
        let resolver = resolver_for(&nodes);
        let root_default = AccessConfig::default().root_default(Category::View);

        for i in 0..nodes.len() {
            let mut cursor = Some(i);
            let mut expected = root_default.clone();
            while let Some(current) = cursor {
                if nodes[current].1 {
                    expected = grants_for(current);
                    break;
                }
                cursor = nodes[current].0;
            }

            prop_assert_eq!(resolver.resolve(forum(i), Category::View).unwrap(), expected.clone());
            // Second call is served from the resolution cache
            prop_assert_eq!(resolver.resolve(forum(i), Category::View).unwrap(), expected);
        }
    }

    #[test]
    fn invalidated_subtree_has_no_fresh_resolutions(nodes in forest(), pick in any::<prop::sample::Index>()) {
        let resolver = resolver_for(&nodes);
        for i in 0..nodes.len() {
            resolver.resolve(forum(i), Category::View).unwrap();
        }

        let anchor = forum(pick.index(nodes.len()));
        let store = resolver.store();
        let invalidated = store.invalidate_subtree(anchor).unwrap();
        let subtree = store.snapshot().tree.subtree(anchor).unwrap();

        prop_assert_eq!(invalidated.len(), subtree.len());
        for id in subtree {
            prop_assert!(store.cached_resolution(id, Category::View).is_none());
        }
    }
}

#[test]
fn test_put_on_child_leaves_parent_resolution_intact() {
    let resolver = editorial_tree();
    let editors = GrantSet::parse_list("role:editor").unwrap();
    let viewers = GrantSet::parse_list("role:viewer").unwrap();

    assert_eq!(resolver.resolve(ForumId(3), Category::View).unwrap(), editors);

    resolver.store().put(AccessRecord::new(ForumId(3)).with_custom(Category::View, viewers.clone())).unwrap();
    assert_eq!(resolver.resolve(ForumId(3), Category::View).unwrap(), viewers);
    assert_eq!(resolver.resolve(ForumId(2), Category::View).unwrap(), editors);
}

#[test]
fn test_switching_back_to_inherited_recomputes_descendants() {
    let resolver = editorial_tree();
    let store = resolver.store();

    store.put(AccessRecord::new(ForumId(3)).with_custom(Category::View, GrantSet::parse_list("role:viewer").unwrap())).unwrap();
    assert_eq!(resolver.resolve(ForumId(3), Category::View).unwrap(), GrantSet::parse_list("role:viewer").unwrap());

    store.put(AccessRecord::new(ForumId(2)).with_inherited(Category::View)).unwrap();
    store.put(AccessRecord::new(ForumId(3)).with_inherited(Category::View)).unwrap();

    let root_default = AccessConfig::default().root_default(Category::View);
    assert_eq!(resolver.resolve(ForumId(3), Category::View).unwrap(), root_default);
    assert_eq!(resolver.resolve_with_source(ForumId(3), Category::View).unwrap().source, None);
}

#[test]
fn test_can_access_follows_inherited_grants() {
    let resolver = editorial_tree();

    assert!(resolver.can_access(UserId(7), ForumId(3), Action::View).unwrap());
    assert!(!resolver.can_access(UserId(8), ForumId(3), Action::View).unwrap());
    // The root keeps its defaults
    assert!(resolver.can_access(UserId(8), ForumId(1), Action::View).unwrap());
    assert!(!resolver.can_access(UserId(0), ForumId(1), Action::Post).unwrap());
}

#[test]
fn test_unknown_forum_is_not_found() {
    let resolver = editorial_tree();
    let err = resolver.can_access(UserId(7), ForumId(99), Action::View).unwrap_err();
    assert_eq!(err.error_class(), "NotFoundError");
}
