//! Batched transform updates.
//!
//! Mutations can be applied immediately through
//! [`SceneGraph::set_local_transform`], or queued with
//! [`SceneGraph::queue_transform`] and applied together by
//! [`SceneGraph::update`]. Queued mutations for the same node merge, later
//! components winning, so a node touched several times in a frame is marked
//! dirty and notified once.
//!
//! [`SceneGraph::refresh_world_matrices`] walks the whole hierarchy with an
//! explicit stack (no recursion, so deep skeletons cannot overflow) and
//! rebuilds every dirty world matrix parents-first.

use glam::Affine3A;

use crate::errors::{Result, SceneError};
use crate::scene::NodeHandle;
use crate::scene::graph::SceneGraph;
use crate::scene::transform::{DirtyFlags, TransformUpdate};

/// What one [`SceneGraph::update`] pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    /// Queued mutations applied.
    pub mutations_applied: usize,
    /// Nodes visited while looking for queued mutations.
    pub nodes_visited: usize,
    /// World matrices rebuilt by the eager refresh (0 when it is disabled).
    pub matrices_refreshed: usize,
}

impl SceneGraph {
    /// Queues a local-transform mutation for the next [`update`](Self::update).
    pub fn queue_transform(&mut self, handle: NodeHandle, update: TransformUpdate) -> Result<()> {
        if !self.contains(handle) {
            return Err(SceneError::NodeNotFound(handle));
        }
        if update.is_empty() {
            return Ok(());
        }
        match self.pending.get_mut(handle) {
            Some(queued) => queued.merge(update),
            None => {
                self.pending.insert(handle, update);
            }
        }
        Ok(())
    }

    /// Number of nodes with a queued mutation.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Applies every queued mutation, parents before children.
    ///
    /// With [`GraphSettings::eager_world_refresh`](crate::settings::GraphSettings::eager_world_refresh)
    /// set, all dirty world matrices are rebuilt afterwards.
    pub fn update(&mut self) -> UpdateStats {
        let mut stats = UpdateStats::default();

        if !self.pending.is_empty() {
            let mut stack: Vec<NodeHandle> = Vec::with_capacity(self.settings.node_capacity);
            stack.extend(self.roots.iter().rev().copied());

            while let Some(handle) = stack.pop() {
                stats.nodes_visited += 1;
                if let Some(update) = self.pending.remove(handle)
                    && self.set_local_transform(handle, update).is_ok()
                {
                    stats.mutations_applied += 1;
                }
                if let Some(node) = self.nodes.get(handle) {
                    stack.extend(node.children.iter().rev().copied());
                }
            }

            // Anything left was queued for a node that is no longer reachable.
            if !self.pending.is_empty() {
                log::warn!("Discarding {} unreachable transform updates", self.pending.len());
                self.pending.clear();
            }
        }

        if self.settings.eager_world_refresh {
            stats.matrices_refreshed = self.refresh_world_matrices();
        }

        log::trace!(
            "Transform update: {} applied, {} visited, {} refreshed",
            stats.mutations_applied,
            stats.nodes_visited,
            stats.matrices_refreshed
        );
        stats
    }

    /// Rebuilds every dirty world matrix in the graph. Returns how many were
    /// rebuilt.
    pub fn refresh_world_matrices(&mut self) -> usize {
        let settings = self.settings;
        let mut refreshed = 0;

        // (node, parent world matrix, parent was rebuilt)
        let mut stack: Vec<(NodeHandle, Affine3A, bool)> = Vec::with_capacity(settings.node_capacity);
        for &root in self.roots.iter().rev() {
            stack.push((root, Affine3A::IDENTITY, false));
        }

        while let Some((handle, parent_world, parent_changed)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(handle) else {
                continue;
            };

            let needs_update = parent_changed || node.transform.dirty.contains(DirtyFlags::WORLD);
            if needs_update {
                let local = node.transform.refresh_local_matrix(&settings);
                node.transform.world_matrix = parent_world * local;
                node.transform.dirty.remove(DirtyFlags::WORLD);
                node.transform.dirty.insert(DirtyFlags::WORLD_INVERSE);
                refreshed += 1;
            }

            let world = node.transform.world_matrix;
            for &child in node.children.iter().rev() {
                stack.push((child, world, needs_update));
            }
        }

        refreshed
    }
}
