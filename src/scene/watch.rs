use smallvec::{SmallVec, smallvec};

use crate::scene::NodeHandle;

/// How long a [`TransformWatch`] stays registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchMode {
    /// Stays registered until [`SceneGraph::unwatch`](crate::scene::SceneGraph::unwatch).
    #[default]
    Persistent,
    /// Deregisters itself from inside its first transform notification.
    Once,
}

/// A subscriber that counts transform notifications.
///
/// Useful for anything that caches data derived from a node's transform
/// (culling bounds, physics proxies) and only needs to know that something
/// changed. A watch is created on its target node and may be registered on
/// further nodes with
/// [`SceneGraph::add_listener`](crate::scene::SceneGraph::add_listener); it
/// stays armed while at least one registration remains.
#[derive(Debug, Clone)]
pub struct TransformWatch {
    pub(crate) target: Option<NodeHandle>,
    pub(crate) mode: WatchMode,
    /// Every node whose registry currently holds this watch.
    pub(crate) registrations: SmallVec<[NodeHandle; 2]>,
    pub(crate) transformed: u32,
    pub(crate) destroyed: bool,
}

impl TransformWatch {
    pub(crate) fn new(target: NodeHandle, mode: WatchMode) -> Self {
        Self {
            target: Some(target),
            mode,
            registrations: smallvec![target],
            transformed: 0,
            destroyed: false,
        }
    }

    /// The node the watch was created on; `None` once it has been destroyed.
    #[inline]
    #[must_use]
    pub fn target(&self) -> Option<NodeHandle> {
        self.target
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    /// Whether the watch is still registered on any node.
    #[inline]
    #[must_use]
    pub fn is_armed(&self) -> bool {
        !self.registrations.is_empty()
    }

    /// Nodes the watch is currently registered on.
    #[inline]
    #[must_use]
    pub fn registrations(&self) -> &[NodeHandle] {
        &self.registrations
    }

    /// Transform notifications received since creation or the last reset.
    #[inline]
    #[must_use]
    pub fn transformed_count(&self) -> u32 {
        self.transformed
    }

    /// `true` once the target node has been destroyed.
    #[inline]
    #[must_use]
    pub fn was_destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn reset(&mut self) {
        self.transformed = 0;
    }

    pub(crate) fn register(&mut self, node: NodeHandle) {
        if !self.registrations.contains(&node) {
            self.registrations.push(node);
        }
    }

    pub(crate) fn deregister(&mut self, node: NodeHandle) {
        self.registrations.retain(|n| *n != node);
    }

    /// Reacts to a registered node being destroyed.
    pub(crate) fn lose(&mut self, node: NodeHandle) {
        self.deregister(node);
        if self.target == Some(node) {
            self.target = None;
            self.destroyed = true;
        }
    }
}
