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
use forumgate_core::GatewayError;
use forumgate_core::access::UserId;
use forumgate_core::notify::Payload;

pub fn enqueue(ctx: &CommandContext, source: &str, recipient: &str, fields: &[String]) -> Result<()> {
    let recipient: UserId = recipient.parse()?;
    let payload = parse_fields(fields)?;

    ctx.gateway.aggregator.enqueue(source, recipient, payload)?;
    ctx.persist()?;

    println!(
        "Queued {} event for user {} ({} pending).",
        source,
        recipient,
        ctx.gateway.aggregator.pending_count(recipient, source)
    );
    Ok(())
}

pub fn trigger_dispatch(ctx: &CommandContext) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let report = runtime.block_on(ctx.gateway.dispatcher.dispatch_report());
    ctx.persist()?;

    println!("Dispatched {} digest(s).", report.delivered);
    if report.dropped > 0 || report.filtered_events > 0 {
        println!("  Dropped: {}, filtered events: {}, skipped: {}", report.dropped, report.filtered_events, report.skipped);
    }
    Ok(())
}

fn parse_fields(fields: &[String]) -> Result<Payload, GatewayError> {
    fields
        .iter()
        .map(|field| match field.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
            _ => Err(GatewayError::validation(format!("payload field must be key=value, got {field:?}"))),
        })
        .collect()
}
