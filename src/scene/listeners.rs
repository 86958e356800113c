//! Transform listener registry.
//!
//! Every node carries a [`ListenerRegistry`]: an ordered, duplicate-free list
//! of [`Subscriber`] handles that want to hear about the node being
//! transformed or destroyed. Subscribers are referenced by arena key, never
//! owned, so a registry entry keeps nothing alive.
//!
//! Dispatch lives on the [`SceneGraph`](crate::scene::SceneGraph), which owns
//! the subscriber arenas. It iterates a [`snapshot`](ListenerRegistry::snapshot)
//! and re-checks membership before each callback, so a subscriber may remove
//! itself (or another) in the middle of a notification pass.

use smallvec::SmallVec;

use crate::scene::{SkinnedBoneKey, WatchKey};

/// Handle to an object that observes a node's transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subscriber {
    /// A bone/skin pairing that caches a deformation matrix.
    SkinnedBone(SkinnedBoneKey),
    /// A general-purpose notification counter.
    Watch(WatchKey),
}

/// Snapshot type returned by [`ListenerRegistry::snapshot`].
pub type SubscriberList = SmallVec<[Subscriber; 4]>;

/// Ordered set of subscriber handles attached to one node.
#[derive(Debug, Clone, Default)]
pub struct ListenerRegistry {
    subscribers: SmallVec<[Subscriber; 2]>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a subscriber. Registering the same subscriber twice is a no-op,
    /// so each event reaches it exactly once.
    ///
    /// Returns `true` if the subscriber was not already registered.
    pub fn add(&mut self, subscriber: Subscriber) -> bool {
        if self.contains(subscriber) {
            return false;
        }
        self.subscribers.push(subscriber);
        true
    }

    /// Removes every occurrence of the subscriber.
    ///
    /// Returns `true` if anything was removed. Removing an unknown subscriber
    /// is not an error.
    pub fn remove(&mut self, subscriber: Subscriber) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| *s != subscriber);
        self.subscribers.len() != before
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, subscriber: Subscriber) -> bool {
        self.subscribers.contains(&subscriber)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Iterates subscribers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = Subscriber> + '_ {
        self.subscribers.iter().copied()
    }

    /// Copies the current subscribers so the caller can dispatch while the
    /// registry itself is being edited.
    #[must_use]
    pub fn snapshot(&self) -> SubscriberList {
        self.subscribers.iter().copied().collect()
    }

    /// Empties the registry, returning what it held.
    pub fn take(&mut self) -> SubscriberList {
        let taken = self.snapshot();
        self.subscribers.clear();
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn keys(n: usize) -> Vec<WatchKey> {
        let mut arena: SlotMap<WatchKey, ()> = SlotMap::with_key();
        (0..n).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn duplicate_add_is_ignored() {
        let k = keys(1);
        let mut registry = ListenerRegistry::new();
        assert!(registry.add(Subscriber::Watch(k[0])));
        assert!(!registry.add(Subscriber::Watch(k[0])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registration_order_is_preserved() {
        let k = keys(3);
        let mut registry = ListenerRegistry::new();
        for key in &k {
            registry.add(Subscriber::Watch(*key));
        }
        registry.remove(Subscriber::Watch(k[1]));
        let order: Vec<_> = registry.iter().collect();
        assert_eq!(order, vec![Subscriber::Watch(k[0]), Subscriber::Watch(k[2])]);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let k = keys(2);
        let mut registry = ListenerRegistry::new();
        registry.add(Subscriber::Watch(k[0]));
        assert!(!registry.remove(Subscriber::Watch(k[1])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn take_empties_registry() {
        let k = keys(2);
        let mut registry = ListenerRegistry::new();
        registry.add(Subscriber::Watch(k[0]));
        registry.add(Subscriber::Watch(k[1]));
        let taken = registry.take();
        assert_eq!(taken.len(), 2);
        assert!(registry.is_empty());
    }
}
