use std::collections::HashMap;
use std::hash::Hash;

use super::Subscription;

/// Subscriptions grouped by the child that owns them.
///
/// A parent attaches the handlers it installs on a child under the child's
/// key and detaches them when the child leaves. Detaching drops exactly that
/// child's subscriptions, once.
pub struct SubscriptionTable<K> {
    entries: HashMap<K, Vec<Subscription>>,
}

impl<K: Eq + Hash> SubscriptionTable<K> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Adds subscriptions for `key`, keeping any it already holds.
    pub fn attach(&mut self, key: K, subscriptions: impl IntoIterator<Item = Subscription>) {
        self.entries.entry(key).or_default().extend(subscriptions);
    }

    /// Unsubscribes everything registered for `key`. Returns false when the
    /// key held nothing.
    pub fn detach(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of children with at least one subscription.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K: Eq + Hash> Default for SubscriptionTable<K> {
    fn default() -> Self {
        Self::new()
    }
}
