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

//! Effective permission resolution over the forum hierarchy

use crate::access::grants::{Action, Category, GrantSet, Grantee, UserId};
use crate::access::store::{AccessRecordStore, AccessSnapshot};
use crate::config::AccessConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::forum::ForumId;
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Supplies the grantees a user counts as within a forum (roles, own user grantee)
#[cfg_attr(test, mockall::automock)]
pub trait MembershipProvider: Send + Sync {
    fn memberships_for(&self, user: UserId, forum: ForumId) -> GrantSet;
}

/// Membership provider backed by a fixed user to roles table.
///
/// User `0` is anonymous. Every other user is `role:authenticated` plus its
/// own `user:<id>` grantee, plus whatever is listed for it.
#[derive(Debug, Clone, Default)]
pub struct StaticMembership {
    roles: HashMap<UserId, GrantSet>,
}

impl StaticMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grantees(mut self, user: UserId, grantees: impl IntoIterator<Item = Grantee>) -> Self {
        let entry = self.roles.entry(user).or_default();
        for grantee in grantees {
            entry.insert(grantee);
        }
        self
    }
}

impl MembershipProvider for StaticMembership {
    fn memberships_for(&self, user: UserId, _forum: ForumId) -> GrantSet {
        let mut memberships = self.roles.get(&user).cloned().unwrap_or_default();
        if user == UserId(0) {
            memberships.insert(Grantee::role("anonymous"));
        } else {
            memberships.insert(Grantee::role("authenticated"));
            memberships.insert(Grantee::User(user));
        }
        memberships
    }
}

/// A resolved grant set and the forum it was taken from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub grants: GrantSet,
    /// Forum holding the custom record, `None` when the root default applied
    pub source: Option<ForumId>,
}

/// Computes effective permissions by walking towards the root
pub struct AccessResolver {
    store: Arc<AccessRecordStore>,
    membership: Arc<dyn MembershipProvider>,
    config: AccessConfig,
}

impl AccessResolver {
    pub fn new(store: Arc<AccessRecordStore>, membership: Arc<dyn MembershipProvider>, config: AccessConfig) -> Self {
        Self { store, membership, config }
    }

    pub fn store(&self) -> &Arc<AccessRecordStore> {
        &self.store
    }

    /// Effective grant set of `category` at `forum_id`
    pub fn resolve(&self, forum_id: ForumId, category: Category) -> GatewayResult<GrantSet> {
        if self.config.resolution_cache {
            if let Some(grants) = self.store.cached_resolution(forum_id, category) {
                counter!("forumgate_resolution_cache_hits", 1);
                return Ok(grants);
            }
            counter!("forumgate_resolution_cache_misses", 1);
        }

        let snapshot = self.store.snapshot();
        let resolution = self.resolve_in(&snapshot, forum_id, category)?;
        if self.config.resolution_cache {
            self.store.cache_resolution(forum_id, category, resolution.grants.clone(), snapshot.version);
        }
        Ok(resolution.grants)
    }

    /// Like [`resolve`](Self::resolve), also reporting which forum supplied the grants. Never cached.
    pub fn resolve_with_source(&self, forum_id: ForumId, category: Category) -> GatewayResult<Resolution> {
        self.resolve_in(&self.store.snapshot(), forum_id, category)
    }

    /// Resolve against an explicit snapshot
    pub fn resolve_in(&self, snapshot: &AccessSnapshot, forum_id: ForumId, category: Category) -> GatewayResult<Resolution> {
        if !snapshot.tree.contains(forum_id) {
            return Err(GatewayError::not_found(format!("forum {forum_id} does not exist")));
        }

        // Missing records count as fully inherited
        let chain = std::iter::once(forum_id).chain(snapshot.tree.ancestors(forum_id)?);
        for forum in chain {
            if let Some(grants) = snapshot.record(forum).and_then(|record| record.custom_grants(category)) {
                return Ok(Resolution {
                    grants: grants.clone(),
                    source: Some(forum),
                });
            }
        }

        Ok(Resolution {
            grants: self.config.root_default(category),
            source: None,
        })
    }

    /// Whether `user` may perform `action` in `forum_id`.
    ///
    /// A denied permission is `Ok(false)`; only an unknown forum is an error.
    pub fn can_access(&self, user: UserId, forum_id: ForumId, action: Action) -> GatewayResult<bool> {
        let start_time = Instant::now();
        let memberships = self.membership.memberships_for(user, forum_id);

        let mut allowed = false;
        for category in action.category().and_stronger() {
            if self.resolve(forum_id, *category)?.intersects(memberships.iter()) {
                allowed = true;
                break;
            }
        }

        let duration = start_time.elapsed();
        if duration > Duration::from_millis(5) {
            warn!(
                user_id = %user,
                forum_id = %forum_id,
                action = %action,
                duration_ms = %duration.as_millis(),
                "Slow access check detected"
            );
        }

        debug!(user_id = %user, forum_id = %forum_id, action = %action, allowed, "Access check completed");
        Ok(allowed)
    }
}
