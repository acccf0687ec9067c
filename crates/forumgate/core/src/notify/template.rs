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

//! Digest template rendering
//!
//! `{name}` placeholders declared by the source are replaced with a bulleted
//! list of one item per event. Placeholders the source does not declare are
//! left untouched.

use crate::notify::source::NotificationSourceDescriptor;
use std::collections::BTreeMap;

/// Render `descriptor.template` against the payloads of the pending events, in order
pub fn render(descriptor: &NotificationSourceDescriptor, payloads: &[&BTreeMap<String, String>]) -> String {
    let template = descriptor.template.as_str();
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_token_name(&after[..close]) => {
                let name = &after[..close];
                if descriptor.message_tokens.contains_key(name) {
                    let field = descriptor.field_for(name);
                    let items: Vec<&str> = payloads.iter().filter_map(|payload| payload.get(field)).map(String::as_str).collect();
                    push_list(&mut rendered, &items);
                } else {
                    rendered.push('{');
                    rendered.push_str(name);
                    rendered.push('}');
                }
                rest = &after[close + 1..];
            }
            _ => {
                rendered.push('{');
                rest = after;
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

/// Bullets are `\n - item`; after an inline space the first bullet stays on the same line
fn push_list(rendered: &mut String, items: &[&str]) {
    let list: String = items.iter().map(|item| format!("\n - {item}")).collect();
    if rendered.ends_with(' ') {
        rendered.push_str(list.strip_prefix("\n ").unwrap_or(&list));
    } else {
        rendered.push_str(&list);
    }
}

fn is_token_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
}
