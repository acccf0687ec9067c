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

//! Access record storage with subtree invalidation
//!
//! Readers take an immutable [`AccessSnapshot`]; writers build a new snapshot
//! and swap it in. Writes are serialized per tree root, and every write
//! invalidates the cached resolutions of the affected subtree before any
//! listener is told about it.

use crate::access::grants::{Category, GrantSet};
use crate::access::record::AccessRecord;
use crate::error::{GatewayError, GatewayResult};
use crate::events::{Listener, Listeners, SubscriptionId};
use crate::forum::{ForumId, ForumTree};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Cache tag invalidated whenever inheritance is re-rooted
pub const FORUM_LIST_TAG: &str = "forum_list";

/// Immutable view of the forum tree and its access records
#[derive(Debug, Clone, Default)]
pub struct AccessSnapshot {
    pub version: u64,
    pub tree: Arc<ForumTree>,
    pub records: Arc<BTreeMap<ForumId, AccessRecord>>,
}

impl AccessSnapshot {
    pub fn record(&self, forum_id: ForumId) -> Option<&AccessRecord> {
        self.records.get(&forum_id)
    }

    /// Nearest ancestor of `forum_id` holding at least one custom category
    pub fn nearest_custom_ancestor(&self, forum_id: ForumId) -> GatewayResult<Option<ForumId>> {
        Ok(self
            .tree
            .ancestors(forum_id)?
            .into_iter()
            .find(|ancestor| self.records.get(ancestor).is_some_and(AccessRecord::has_any_custom)))
    }

    fn bumped(&self) -> Self {
        Self {
            version: self.version + 1,
            tree: self.tree.clone(),
            records: self.records.clone(),
        }
    }
}

/// Emitted after a record (or the tree shape) changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecordChange {
    /// The forum whose record changed
    pub forum_id: ForumId,
    /// Top-most affected ancestor: the nearest custom ancestor, else the tree root; `None` for a root forum
    pub parent_tid: Option<ForumId>,
    /// `forum_id` and every descendant whose cached resolutions were dropped
    pub affected: Vec<ForumId>,
    /// Store version the change produced
    pub version: u64,
}

impl AccessRecordChange {
    /// Cache tags a rendering layer must drop in response to this change
    pub fn cache_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.affected.iter().map(|forum| format!("forum:{forum}")).collect();
        if let Some(parent) = self.parent_tid {
            tags.push(format!("forum:{parent}"));
        }
        tags.push(FORUM_LIST_TAG.to_string());
        tags
    }
}

#[derive(Debug, Clone)]
struct CachedResolution {
    grants: GrantSet,
    version: u64,
}

#[derive(Debug, Default)]
struct ResolutionCache {
    entries: HashMap<(ForumId, Category), CachedResolution>,
    invalidated_at: HashMap<ForumId, u64>,
}

impl ResolutionCache {
    fn is_fresh(&self, forum_id: ForumId, version: u64) -> bool {
        self.invalidated_at.get(&forum_id).is_none_or(|invalidated| version >= *invalidated)
    }
}

/// Persists access records and hands out consistent snapshots
#[derive(Debug)]
pub struct AccessRecordStore {
    snapshot: RwLock<Arc<AccessSnapshot>>,
    resolutions: RwLock<ResolutionCache>,
    subtree_locks: DashMap<ForumId, Arc<Mutex<()>>>,
    listeners: Listeners<AccessRecordChange>,
    lock_timeout: Duration,
}

impl AccessRecordStore {
    pub fn new(tree: ForumTree, lock_timeout: Duration) -> Self {
        Self::with_snapshot(
            AccessSnapshot {
                version: 0,
                tree: Arc::new(tree),
                records: Arc::default(),
            },
            lock_timeout,
        )
    }

    /// Restore a store from previously exported state.
    ///
    /// Every record must pass [`AccessRecord::validate`] and belong to a forum of `tree`.
    pub fn from_parts(tree: ForumTree, records: Vec<AccessRecord>, lock_timeout: Duration) -> GatewayResult<Self> {
        let mut by_forum = BTreeMap::new();
        for record in records {
            record.validate()?;
            if !tree.contains(record.forum_id) {
                return Err(GatewayError::validation(format!("access record for forum {} which is not in the forum tree", record.forum_id)));
            }
            by_forum.insert(record.forum_id, record);
        }

        Ok(Self::with_snapshot(
            AccessSnapshot {
                version: 0,
                tree: Arc::new(tree),
                records: Arc::new(by_forum),
            },
            lock_timeout,
        ))
    }

    fn with_snapshot(snapshot: AccessSnapshot, lock_timeout: Duration) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            resolutions: RwLock::new(ResolutionCache::default()),
            subtree_locks: DashMap::new(),
            listeners: Listeners::new(),
            lock_timeout,
        }
    }

    /// The current consistent view
    pub fn snapshot(&self) -> Arc<AccessSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.snapshot.read().version
    }

    pub fn get(&self, forum_id: ForumId) -> Option<AccessRecord> {
        self.snapshot().record(forum_id).cloned()
    }

    /// Tree and records, for persistence
    pub fn export(&self) -> (ForumTree, Vec<AccessRecord>) {
        let snapshot = self.snapshot();
        ((*snapshot.tree).clone(), snapshot.records.values().cloned().collect())
    }

    pub fn subscribe(&self, listener: Listener<AccessRecordChange>) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Store a record, invalidate its subtree and notify listeners
    pub fn put(&self, record: AccessRecord) -> GatewayResult<AccessRecordChange> {
        record.validate()?;
        let forum_id = record.forum_id;

        let change = self.with_subtree_locks(&[forum_id], || {
            let snapshot = self.swap(|next| {
                if !next.tree.contains(forum_id) {
                    return Err(GatewayError::not_found(format!("forum {forum_id} does not exist")));
                }
                Arc::make_mut(&mut next.records).insert(forum_id, record);
                Ok(())
            })?;
            self.change_for(&snapshot, forum_id)
        })?;

        info!(forum_id = %forum_id, parent_tid = ?change.parent_tid, affected = change.affected.len(), version = change.version, "Access record stored");
        self.listeners.notify(&change);
        Ok(change)
    }

    /// Drop the record of a forum so every category inherits again
    pub fn clear(&self, forum_id: ForumId) -> GatewayResult<AccessRecordChange> {
        let change = self.with_subtree_locks(&[forum_id], || {
            let snapshot = self.swap(|next| {
                if !next.tree.contains(forum_id) {
                    return Err(GatewayError::not_found(format!("forum {forum_id} does not exist")));
                }
                Arc::make_mut(&mut next.records).remove(&forum_id);
                Ok(())
            })?;
            self.change_for(&snapshot, forum_id)
        })?;

        info!(forum_id = %forum_id, version = change.version, "Access record cleared");
        self.listeners.notify(&change);
        Ok(change)
    }

    /// Invalidate cached resolutions of `forum_id` and all of its descendants
    pub fn invalidate_subtree(&self, forum_id: ForumId) -> GatewayResult<Vec<ForumId>> {
        self.with_subtree_locks(&[forum_id], || {
            let snapshot = self.swap(|next| {
                next.tree.subtree(forum_id)?;
                Ok(())
            })?;
            self.invalidate_locked(&snapshot, forum_id)
        })
    }

    /// Add a forum to the tree
    pub fn insert_forum(&self, forum_id: ForumId, parent: Option<ForumId>) -> GatewayResult<()> {
        let anchor = parent.map(|p| vec![p]).unwrap_or_default();
        self.with_subtree_locks(&anchor, || {
            self.swap(|next| Arc::make_mut(&mut next.tree).insert(forum_id, parent))?;
            Ok(())
        })?;
        debug!(forum_id = %forum_id, parent = ?parent, "Forum added");
        Ok(())
    }

    /// Move a forum (and its subtree) below a new parent
    pub fn move_forum(&self, forum_id: ForumId, new_parent: Option<ForumId>) -> GatewayResult<AccessRecordChange> {
        let mut anchors = vec![forum_id];
        anchors.extend(new_parent);

        let change = self.with_subtree_locks(&anchors, || {
            let snapshot = self.swap(|next| Arc::make_mut(&mut next.tree).reparent(forum_id, new_parent))?;
            self.change_for(&snapshot, forum_id)
        })?;

        info!(forum_id = %forum_id, new_parent = ?new_parent, "Forum moved");
        self.listeners.notify(&change);
        Ok(change)
    }

    /// Remove a leaf forum together with its record
    pub fn remove_forum(&self, forum_id: ForumId) -> GatewayResult<()> {
        self.with_subtree_locks(&[forum_id], || {
            let snapshot = self.swap(|next| {
                Arc::make_mut(&mut next.tree).remove(forum_id)?;
                Arc::make_mut(&mut next.records).remove(&forum_id);
                Ok(())
            })?;
            let mut cache = self.resolutions.write();
            cache.entries.retain(|(forum, _), _| *forum != forum_id);
            cache.invalidated_at.insert(forum_id, snapshot.version);
            Ok(())
        })?;
        debug!(forum_id = %forum_id, "Forum removed");
        Ok(())
    }

    /// Cached resolution for `(forum_id, category)`, if still fresh
    pub fn cached_resolution(&self, forum_id: ForumId, category: Category) -> Option<GrantSet> {
        let cache = self.resolutions.read();
        cache
            .entries
            .get(&(forum_id, category))
            .filter(|entry| cache.is_fresh(forum_id, entry.version))
            .map(|entry| entry.grants.clone())
    }

    /// Remember a resolution computed from the snapshot at `version`
    pub fn cache_resolution(&self, forum_id: ForumId, category: Category, grants: GrantSet, version: u64) {
        let mut cache = self.resolutions.write();
        if !cache.is_fresh(forum_id, version) {
            debug!(forum_id = %forum_id, category = %category, version, "Discarding resolution computed before invalidation");
            return;
        }
        cache.entries.insert((forum_id, category), CachedResolution { grants, version });
    }

    pub fn cached_resolution_count(&self) -> usize {
        self.resolutions.read().entries.len()
    }

    fn change_for(&self, snapshot: &AccessSnapshot, forum_id: ForumId) -> GatewayResult<AccessRecordChange> {
        let affected = self.invalidate_locked(snapshot, forum_id)?;
        let parent_tid = match snapshot.nearest_custom_ancestor(forum_id)? {
            Some(ancestor) => Some(ancestor),
            None => Some(snapshot.tree.root_of(forum_id)?).filter(|root| *root != forum_id),
        };
        Ok(AccessRecordChange {
            forum_id,
            parent_tid,
            affected,
            version: snapshot.version,
        })
    }

    /// Drop every cached resolution in the subtree in one step so readers never see it half done
    fn invalidate_locked(&self, snapshot: &AccessSnapshot, forum_id: ForumId) -> GatewayResult<Vec<ForumId>> {
        let subtree = snapshot.tree.subtree(forum_id)?;
        let mut cache = self.resolutions.write();
        for forum in &subtree {
            cache.invalidated_at.insert(*forum, snapshot.version);
        }
        cache.entries.retain(|(forum, _), _| !subtree.contains(forum));
        debug!(forum_id = %forum_id, count = subtree.len(), version = snapshot.version, "Subtree invalidated");
        Ok(subtree)
    }

    /// Apply `mutate` to a copy of the current snapshot and publish it under a new version
    fn swap(&self, mutate: impl FnOnce(&mut AccessSnapshot) -> GatewayResult<()>) -> GatewayResult<Arc<AccessSnapshot>> {
        let mut current = self.snapshot.write();
        let mut next = current.bumped();
        mutate(&mut next)?;
        let next = Arc::new(next);
        *current = next.clone();
        Ok(next)
    }

    fn roots_of(&self, anchors: &[ForumId]) -> GatewayResult<Vec<ForumId>> {
        let snapshot = self.snapshot();
        let mut roots = anchors.iter().map(|forum| snapshot.tree.root_of(*forum)).collect::<GatewayResult<Vec<_>>>()?;
        roots.sort();
        roots.dedup();
        Ok(roots)
    }

    /// Run `write` while holding the locks of every tree root the anchors belong to
    fn with_subtree_locks<R>(&self, anchors: &[ForumId], write: impl FnOnce() -> GatewayResult<R>) -> GatewayResult<R> {
        // Roots may change under a concurrent move, so re-check once the locks are held
        let mut roots = self.roots_of(anchors)?;
        loop {
            let locks: Vec<Arc<Mutex<()>>> = roots.iter().map(|root| self.subtree_locks.entry(*root).or_default().clone()).collect();
            let mut guards = Vec::with_capacity(locks.len());
            for (root, lock) in roots.iter().zip(&locks) {
                let guard = lock
                    .try_lock_for(self.lock_timeout)
                    .ok_or_else(|| GatewayError::concurrent_modification(format!("timed out after {:?} waiting for the subtree lock of forum {root}", self.lock_timeout)))?;
                guards.push(guard);
            }

            let current = self.roots_of(anchors)?;
            if current == roots {
                return write();
            }
            drop(guards);
            roots = current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::grants::Grantee;
    use crate::access::record::{CategoryAccess, Inheritance};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tree() -> ForumTree {
        // 1 -> 2 -> 3 -> 4
        ForumTree::from_edges([(ForumId(1), None), (ForumId(2), Some(ForumId(1))), (ForumId(3), Some(ForumId(2))), (ForumId(4), Some(ForumId(3)))]).unwrap()
    }

    fn editors() -> GrantSet {
        [Grantee::role("editor")].into_iter().collect()
    }

    #[test]
    fn test_put_and_get() {
        let store = AccessRecordStore::new(tree(), Duration::from_millis(100));
        assert!(store.get(ForumId(2)).is_none());

        let record = AccessRecord::new(ForumId(2)).with_custom(Category::View, editors());
        store.put(record.clone()).unwrap();
        assert_eq!(store.get(ForumId(2)), Some(record));
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_put_unknown_forum() {
        let store = AccessRecordStore::new(tree(), Duration::from_millis(100));
        let result = store.put(AccessRecord::new(ForumId(42)));
        assert!(matches!(result, Err(GatewayError::NotFound { .. })));
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_change_reports_nearest_custom_ancestor() {
        let store = AccessRecordStore::new(tree(), Duration::from_millis(100));
        store.put(AccessRecord::new(ForumId(2)).with_custom(Category::View, editors())).unwrap();

        let change = store.put(AccessRecord::new(ForumId(4)).with_inherited(Category::View)).unwrap();
        assert_eq!(change.parent_tid, Some(ForumId(2)));
        assert_eq!(change.affected, vec![ForumId(4)]);

        let change = store.put(AccessRecord::new(ForumId(3))).unwrap();
        assert_eq!(change.parent_tid, Some(ForumId(2)));
        assert_eq!(change.affected, vec![ForumId(3), ForumId(4)]);
    }

    #[test]
    fn test_change_without_custom_ancestor_reports_root() {
        let store = AccessRecordStore::new(tree(), Duration::from_millis(100));
        let change = store.put(AccessRecord::new(ForumId(3))).unwrap();
        assert_eq!(change.parent_tid, Some(ForumId(1)));

        let change = store.put(AccessRecord::new(ForumId(1))).unwrap();
        assert_eq!(change.parent_tid, None);
        assert_eq!(change.affected.len(), 4);
    }

    #[test]
    fn test_invalidate_subtree_is_transitive() {
        let store = AccessRecordStore::new(tree(), Duration::from_millis(100));
        let version = store.version();
        for forum in 1..=4 {
            store.cache_resolution(ForumId(forum), Category::View, editors(), version);
        }
        assert_eq!(store.cached_resolution_count(), 4);

        let affected = store.invalidate_subtree(ForumId(2)).unwrap();
        assert_eq!(affected, vec![ForumId(2), ForumId(3), ForumId(4)]);
        assert!(store.cached_resolution(ForumId(1), Category::View).is_some());
        for forum in 2..=4 {
            assert!(store.cached_resolution(ForumId(forum), Category::View).is_none());
        }
    }

    #[test]
    fn test_stale_resolution_is_not_cached() {
        let store = AccessRecordStore::new(tree(), Duration::from_millis(100));
        let stale_version = store.version();
        store.invalidate_subtree(ForumId(1)).unwrap();

        store.cache_resolution(ForumId(3), Category::View, editors(), stale_version);
        assert!(store.cached_resolution(ForumId(3), Category::View).is_none());

        store.cache_resolution(ForumId(3), Category::View, editors(), store.version());
        assert_eq!(store.cached_resolution(ForumId(3), Category::View), Some(editors()));
    }

    #[test]
    fn test_listeners_receive_changes() {
        let store = AccessRecordStore::new(tree(), Duration::from_millis(100));
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        store.subscribe(Arc::new(move |change: &AccessRecordChange| {
            seen_clone.fetch_add(change.affected.len(), Ordering::SeqCst);
        }));

        store.put(AccessRecord::new(ForumId(3))).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_tags() {
        let change = AccessRecordChange {
            forum_id: ForumId(3),
            parent_tid: Some(ForumId(1)),
            affected: vec![ForumId(3), ForumId(4)],
            version: 9,
        };
        assert_eq!(change.cache_tags(), vec!["forum:3", "forum:4", "forum:1", FORUM_LIST_TAG]);
    }

    #[test]
    fn test_lock_contention_times_out() {
        let store = Arc::new(AccessRecordStore::new(tree(), Duration::from_millis(20)));
        let lock = store.subtree_locks.entry(ForumId(1)).or_default().clone();
        let _held = lock.lock();

        let result = store.put(AccessRecord::new(ForumId(4)));
        assert!(matches!(result, Err(GatewayError::ConcurrentModification { .. })));
    }

    #[test]
    fn test_move_forum_invalidates_moved_subtree() {
        let store = AccessRecordStore::new(tree(), Duration::from_millis(100));
        store.insert_forum(ForumId(5), None).unwrap();
        let version = store.version();
        store.cache_resolution(ForumId(4), Category::View, editors(), version);

        let change = store.move_forum(ForumId(3), Some(ForumId(5))).unwrap();
        assert_eq!(change.affected, vec![ForumId(3), ForumId(4)]);
        assert_eq!(change.parent_tid, Some(ForumId(5)));
        assert!(store.cached_resolution(ForumId(4), Category::View).is_none());
        assert_eq!(store.snapshot().tree.root_of(ForumId(4)).unwrap(), ForumId(5));
    }

    #[test]
    fn test_clear_restores_inheritance() {
        let store = AccessRecordStore::new(tree(), Duration::from_millis(100));
        store.put(AccessRecord::new(ForumId(2)).with_custom(Category::View, editors())).unwrap();

        let change = store.clear(ForumId(2)).unwrap();
        assert!(store.get(ForumId(2)).is_none());
        assert_eq!(change.affected, vec![ForumId(2), ForumId(3), ForumId(4)]);
        assert_eq!(change.parent_tid, Some(ForumId(1)));
    }

    #[test]
    fn test_remove_forum_only_removes_leaves() {
        let store = AccessRecordStore::new(tree(), Duration::from_millis(100));
        store.put(AccessRecord::new(ForumId(4)).with_custom(Category::View, editors())).unwrap();

        assert!(matches!(store.remove_forum(ForumId(3)), Err(GatewayError::Validation { .. })));
        store.remove_forum(ForumId(4)).unwrap();
        assert!(!store.snapshot().tree.contains(ForumId(4)));
        assert!(store.get(ForumId(4)).is_none());
    }

    #[test]
    fn test_from_parts_rejects_malformed_records() {
        let mut inherited_with_grants = AccessRecord::new(ForumId(2));
        inherited_with_grants.set(Category::View, CategoryAccess { mode: Inheritance::Inherited, grants: editors() });
        let err = AccessRecordStore::from_parts(tree(), vec![inherited_with_grants], Duration::from_millis(100)).unwrap_err();
        assert_eq!(err.error_class(), "ValidationError");

        let dangling = AccessRecord::new(ForumId(42)).with_custom(Category::View, editors());
        let err = AccessRecordStore::from_parts(tree(), vec![dangling], Duration::from_millis(100)).unwrap_err();
        assert_eq!(err.error_class(), "ValidationError");

        let store = AccessRecordStore::from_parts(tree(), vec![AccessRecord::new(ForumId(3)).with_custom(Category::View, editors())], Duration::from_millis(100)).unwrap();
        assert!(store.get(ForumId(3)).is_some_and(|record| record.is_custom(Category::View)));
    }
}
