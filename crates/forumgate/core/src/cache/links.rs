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

//! Link sets: alter registry and tag-invalidated cache

use crate::access::store::AccessRecordChange;
use crate::cache::context::{CacheKeyDeriver, RequestContext};
use crate::events::{Listener, SubscriptionId, generate_subscription_id};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// A single rendered link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub weight: i32,
}

impl Link {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            weight: 0,
        }
    }
}

/// Named links plus the cache tags the rendering depends on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSet {
    pub links: BTreeMap<String, Link>,
    pub cache_tags: BTreeSet<String>,
}

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_link(mut self, key: impl Into<String>, link: Link) -> Self {
        self.links.insert(key.into(), link);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.cache_tags.insert(tag.into());
        self
    }

    /// Links ordered by weight, then key
    pub fn ordered(&self) -> Vec<(&String, &Link)> {
        let mut links: Vec<_> = self.links.iter().collect();
        links.sort_by(|(ka, a), (kb, b)| a.weight.cmp(&b.weight).then_with(|| ka.cmp(kb)));
        links
    }
}

/// Alters a link set before it is cached
pub trait LinkAlterer: Send + Sync {
    fn alter(&self, links: &mut LinkSet, context: &RequestContext);
}

impl<F> LinkAlterer for F
where
    F: Fn(&mut LinkSet, &RequestContext) + Send + Sync,
{
    fn alter(&self, links: &mut LinkSet, context: &RequestContext) {
        self(links, context)
    }
}

/// Alterers applied in registration order
#[derive(Default)]
pub struct LinkAlterRegistry {
    alterers: RwLock<Vec<(SubscriptionId, Arc<dyn LinkAlterer>)>>,
}

impl LinkAlterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, alterer: Arc<dyn LinkAlterer>) -> SubscriptionId {
        let id = generate_subscription_id();
        self.alterers.write().push((id, alterer));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut alterers = self.alterers.write();
        let before = alterers.len();
        alterers.retain(|(entry, _)| *entry != id);
        alterers.len() != before
    }

    pub fn build(&self, context: &RequestContext, mut links: LinkSet) -> LinkSet {
        let alterers: Vec<Arc<dyn LinkAlterer>> = self.alterers.read().iter().map(|(_, alterer)| alterer.clone()).collect();
        for alterer in alterers {
            alterer.alter(&mut links, context);
        }
        links
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Rendered link sets keyed by the derived cache key of a request
#[derive(Debug)]
pub struct LinkSetCache {
    namespace: String,
    deriver: CacheKeyDeriver,
    entries: DashMap<String, LinkSet>,
    /// Bumped by every invalidation; guarded so an insert never interleaves with a sweep
    generation: RwLock<u64>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LinkSetCache {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            deriver: CacheKeyDeriver,
            entries: DashMap::new(),
            generation: RwLock::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn key_for(&self, context: &RequestContext) -> String {
        format!("{}:{}", self.namespace, self.deriver.derive_key(context))
    }

    pub fn get(&self, context: &RequestContext) -> Option<LinkSet> {
        let key = self.key_for(context);
        match self.entries.get(&key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Link set cache hit for key: {}", key);
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Link set cache miss for key: {}", key);
                None
            }
        }
    }

    pub fn get_or_build(&self, context: &RequestContext, build: impl FnOnce() -> LinkSet) -> LinkSet {
        if let Some(links) = self.get(context) {
            return links;
        }
        let started = *self.generation.read();
        let links = build();

        let generation = self.generation.read();
        if *generation == started {
            self.entries.insert(self.key_for(context), links.clone());
        } else {
            debug!("Not caching link set built across an invalidation");
        }
        links
    }

    /// Drop every entry carrying one of `tags`; returns how many were dropped
    pub fn invalidate_tags(&self, tags: &[String]) -> usize {
        let mut generation = self.generation.write();
        *generation += 1;
        let before = self.entries.len();
        self.entries.retain(|_, links| !tags.iter().any(|tag| links.cache_tags.contains(tag)));
        let evicted = before.saturating_sub(self.entries.len());
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        if evicted > 0 {
            debug!("Invalidated {} link set(s) for tags {:?}", evicted, tags);
        }
        evicted
    }

    /// Listener dropping entries tagged by an access change
    pub fn access_listener(self: &Arc<Self>) -> Listener<AccessRecordChange> {
        let cache = Arc::clone(self);
        Arc::new(move |change: &AccessRecordChange| {
            cache.invalidate_tags(&change.cache_tags());
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forum::ForumId;

    #[test]
    fn test_alterers_run_in_order() {
        let registry = LinkAlterRegistry::new();
        registry.subscribe(Arc::new(|links: &mut LinkSet, _: &RequestContext| {
            links.links.insert("reply".to_string(), Link::new("Reply", "/reply"));
        }));
        registry.subscribe(Arc::new(|links: &mut LinkSet, context: &RequestContext| {
            if let Some(link) = links.links.get_mut("reply") {
                link.title = format!("{} ({})", link.title, context.langcode);
            }
        }));

        let links = registry.build(&RequestContext::new("full", "en"), LinkSet::new());
        assert_eq!(links.links["reply"].title, "Reply (en)");
    }

    #[test]
    fn test_cache_varies_by_context() {
        let cache = LinkSetCache::new("forum_links");
        let full = RequestContext::new("full", "en");
        let teaser = RequestContext::new("teaser", "en");

        cache.get_or_build(&full, || LinkSet::new().with_link("a", Link::new("A", "/a")));
        let built = cache.get_or_build(&teaser, || LinkSet::new().with_link("b", Link::new("B", "/b")));
        assert!(built.links.contains_key("b"));

        let cached = cache.get_or_build(&full, || panic!("should be cached"));
        assert!(cached.links.contains_key("a"));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_access_change_drops_tagged_entries() {
        let cache = Arc::new(LinkSetCache::new("forum_links"));
        cache.get_or_build(&RequestContext::new("full", "en"), || LinkSet::new().with_tag("forum:4"));
        cache.get_or_build(&RequestContext::new("full", "de"), || LinkSet::new().with_tag("forum:9"));

        let listener = cache.access_listener();
        listener(&AccessRecordChange {
            forum_id: ForumId(3),
            parent_tid: Some(ForumId(1)),
            affected: vec![ForumId(3), ForumId(4)],
            version: 2,
        });

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&RequestContext::new("full", "de")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_ordered_links() {
        let mut late = Link::new("Late", "/late");
        late.weight = 10;
        let links = LinkSet::new().with_link("z", Link::new("Z", "/z")).with_link("a", late).with_link("m", Link::new("M", "/m"));
        let keys: Vec<&str> = links.ordered().into_iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["m", "z", "a"]);
    }

    #[test]
    fn test_link_set_built_across_invalidation_is_not_cached() {
        let cache = LinkSetCache::new("forum_links");
        let context = RequestContext::new("full", "en");

        let links = cache.get_or_build(&context, || {
            // An access change lands while the links are being rendered
            cache.invalidate_tags(&["forum:2".to_string()]);
            LinkSet::new().with_tag("forum:2")
        });
        assert!(links.cache_tags.contains("forum:2"));
        assert!(cache.is_empty());

        cache.get_or_build(&context, || LinkSet::new().with_tag("forum:2"));
        assert_eq!(cache.len(), 1);
    }
}
