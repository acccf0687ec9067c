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

use forumgate_core::cache::{CacheKeyDeriver, RequestContext};

pub fn print_cache_key(view_mode: &str, langcode: &str, location: Option<&str>) {
    let mut context = RequestContext::new(view_mode, langcode);
    if let Some(location) = location {
        context = context.with_location(location);
    }
    println!("{}", CacheKeyDeriver.derive_key(&context));
}
