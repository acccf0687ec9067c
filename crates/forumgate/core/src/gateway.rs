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

//! Gateway wiring

use crate::access::{AccessRecord, AccessRecordStore, AccessResolver, MembershipProvider};
use crate::cache::LinkSetCache;
use crate::config::GatewayConfig;
use crate::error::GatewayResult;
use crate::forum::ForumTree;
use crate::notify::{DeliveryChannel, NotificationAggregator, NotificationDispatcher, SourceRegistry};
use std::sync::Arc;
use tracing::info;

/// Namespace of the forum link set cache
pub const FORUM_LINKS: &str = "forum_links";

/// All gateway components, wired with explicit dependencies
pub struct Gateway {
    pub config: GatewayConfig,
    pub store: Arc<AccessRecordStore>,
    pub resolver: Arc<AccessResolver>,
    pub aggregator: Arc<NotificationAggregator>,
    pub links: Arc<LinkSetCache>,
    pub dispatcher: Arc<NotificationDispatcher>,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        tree: ForumTree,
        records: Vec<AccessRecord>,
        registry: SourceRegistry,
        membership: Arc<dyn MembershipProvider>,
        channel: Arc<dyn DeliveryChannel>,
    ) -> GatewayResult<Self> {
        let store = Arc::new(AccessRecordStore::from_parts(tree, records, config.access.lock_timeout())?);
        let resolver = Arc::new(AccessResolver::new(store.clone(), membership, config.access.clone()));
        let aggregator = Arc::new(NotificationAggregator::new(Arc::new(registry)));
        let links = Arc::new(LinkSetCache::new(FORUM_LINKS));
        store.subscribe(links.access_listener());

        let dispatcher = Arc::new(NotificationDispatcher::new(aggregator.clone(), resolver.clone(), channel, config.dispatch.clone()));

        info!(forums = store.snapshot().tree.len(), sources = aggregator.registry().len(), "Gateway initialized");
        Ok(Self {
            config,
            store,
            resolver,
            aggregator,
            links,
            dispatcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{Category, GrantSet, Grantee, StaticMembership};
    use crate::cache::{LinkSet, RequestContext};
    use crate::forum::ForumId;
    use crate::notify::{LogChannel, SourceRegistryBuilder};

    #[test]
    fn test_access_change_invalidates_link_cache() {
        let tree = ForumTree::from_edges([(ForumId(1), None), (ForumId(2), Some(ForumId(1)))]).unwrap();
        let gateway = Gateway::new(
            GatewayConfig::default(),
            tree,
            Vec::new(),
            SourceRegistryBuilder::with_defaults().build(),
            Arc::new(StaticMembership::new()),
            Arc::new(LogChannel),
        )
        .unwrap();

        let context = RequestContext::new("full", "en");
        gateway.links.get_or_build(&context, || LinkSet::new().with_tag("forum:2"));
        assert_eq!(gateway.links.len(), 1);

        let editors: GrantSet = [Grantee::role("editor")].into_iter().collect();
        gateway.store.put(AccessRecord::new(ForumId(1)).with_custom(Category::View, editors)).unwrap();
        assert!(gateway.links.is_empty());
    }
}
