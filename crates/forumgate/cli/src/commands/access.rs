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

use super::CommandContext;
use anyhow::Result;
use forumgate_core::access::{AccessRecord, AccessResolver, Action, Category, CategoryAccess, GrantSet, Grantee, Inheritance, StaticMembership, UserId};
use forumgate_core::{ForumId, GatewayError};
use std::sync::Arc;

pub fn add_forum(ctx: &CommandContext, forum_id: &str, parent: Option<&str>) -> Result<()> {
    let forum_id: ForumId = forum_id.parse()?;
    let parent = parent.map(str::parse::<ForumId>).transpose()?;

    ctx.gateway.store.insert_forum(forum_id, parent)?;
    ctx.persist()?;

    match parent {
        Some(parent) => println!("Forum {} added below forum {}.", forum_id, parent),
        None => println!("Forum {} added as a root forum.", forum_id),
    }
    Ok(())
}

pub fn set_access(ctx: &CommandContext, forum_id: &str, category: &str, mode: &str, grants: Option<&str>) -> Result<()> {
    let forum_id: ForumId = forum_id.parse()?;
    let category: Category = category.parse()?;
    let mode: Inheritance = mode.parse()?;
    let grants = grants.map(GrantSet::parse_list).transpose()?.unwrap_or_default();

    let mut record = ctx.gateway.store.get(forum_id).unwrap_or_else(|| AccessRecord::new(forum_id));
    // Inherited with grants is kept as given so validation rejects it
    record.set(category, CategoryAccess { mode, grants });

    let change = ctx.gateway.store.put(record)?;
    ctx.persist()?;

    println!("Access updated for forum {} ({} is now {}).", forum_id, category, mode);
    println!("  Invalidated forums: {}", join(change.affected.iter()));
    match change.parent_tid {
        Some(parent) => println!("  Top-most affected ancestor: {}", parent),
        None => println!("  Top-most affected ancestor: none"),
    }
    println!("  Cache tags: {}", change.cache_tags().join(", "));
    Ok(())
}

pub fn show_access(ctx: &CommandContext, forum_id: &str, category: Option<&str>) -> Result<()> {
    let forum_id: ForumId = forum_id.parse()?;
    let categories = match category {
        Some(category) => vec![category.parse::<Category>()?],
        None => Category::ALL.to_vec(),
    };

    let record = ctx.gateway.store.get(forum_id);
    println!("{:<12} {:<10} {:<30} {:<30} {:<10}", "Category", "Mode", "Stored", "Effective", "From");
    println!("{}", "-".repeat(96));

    for category in categories {
        let resolution = ctx.gateway.resolver.resolve_with_source(forum_id, category)?;
        let (mode, stored) = match record.as_ref().and_then(|record| record.custom_grants(category)) {
            Some(grants) => (Inheritance::Custom, grants.to_string()),
            None => (Inheritance::Inherited, "-".to_string()),
        };
        let from = resolution.source.map(|source| format!("forum {}", source)).unwrap_or_else(|| "default".to_string());

        println!("{:<12} {:<10} {:<30} {:<30} {:<10}", category.to_string(), mode.to_string(), stored, resolution.grants.to_string(), from);
    }
    Ok(())
}

pub fn can_access(ctx: &CommandContext, user: &str, forum_id: &str, action: &str, grantees: &[String]) -> Result<()> {
    let user: UserId = user.parse()?;
    let forum_id: ForumId = forum_id.parse()?;
    let action: Action = action.parse()?;
    let grantees = grantees.iter().map(|grantee| grantee.parse::<Grantee>()).collect::<Result<Vec<_>, GatewayError>>()?;

    let membership = StaticMembership::new().with_grantees(user, grantees);
    let resolver = AccessResolver::new(ctx.gateway.store.clone(), Arc::new(membership), ctx.gateway.config.access.clone());

    if resolver.can_access(user, forum_id, action)? {
        println!("allowed: user {} may {} in forum {}", user, action, forum_id);
    } else {
        println!("denied: user {} may not {} in forum {}", user, action, forum_id);
    }
    Ok(())
}

fn join<'a>(forums: impl Iterator<Item = &'a ForumId>) -> String {
    forums.map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
