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

//! Typed listener registries
//!
//! Components expose `subscribe` and invoke listeners synchronously, in
//! registration order.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A unique identifier for a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub usize);

/// Listener callback
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

// Counter for generating unique subscription IDs
static SUBSCRIPTION_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn generate_subscription_id() -> SubscriptionId {
    SubscriptionId(SUBSCRIPTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Ordered list of listeners for one event type
pub struct Listeners<T> {
    entries: RwLock<Vec<(SubscriptionId, Listener<T>)>>,
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Self { entries: RwLock::new(Vec::new()) }
    }

    pub fn subscribe(&self, listener: Listener<T>) -> SubscriptionId {
        let id = generate_subscription_id();
        self.entries.write().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Invoke every listener with `event`
    pub fn notify(&self, event: &T) {
        // Snapshot the list so a listener may subscribe without deadlocking
        let listeners: Vec<Listener<T>> = self.entries.read().iter().map(|(_, listener)| listener.clone()).collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners").field("count", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_listeners_run_in_registration_order() {
        let listeners: Listeners<u32> = Listeners::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let calls = calls.clone();
            listeners.subscribe(Arc::new(move |value: &u32| calls.lock().push(format!("{tag}:{value}"))));
        }

        listeners.notify(&7);
        assert_eq!(*calls.lock(), vec!["first:7", "second:7", "third:7"]);
    }

    #[test]
    fn test_unsubscribe() {
        let listeners: Listeners<u32> = Listeners::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let id = listeners.subscribe(Arc::new(move |value: &u32| {
            counter_clone.fetch_add(*value as usize, Ordering::SeqCst);
        }));

        listeners.notify(&5);
        assert!(listeners.unsubscribe(id));
        assert!(!listeners.unsubscribe(id));
        listeners.notify(&10);

        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(listeners.is_empty());
    }
}
