//! Chainable node operation wrapper.
//!
//! [`SceneNode`] borrows a [`SceneGraph`] mutably and provides a fluent API
//! for posing nodes without threading a `Result` through every call.
//!
//! All methods silently no-op when the handle is stale, so a pose script run
//! against a partly torn-down skeleton never panics. Every setter that does
//! land goes through [`SceneGraph::set_local_transform`], so the subtree is
//! marked dirty and listeners are notified exactly as for a direct call.
//!
//! # Example
//!
//! ```rust,ignore
//! graph.node_mut(forearm)
//!     .set_position(0.0, 1.5, 0.0)
//!     .rotate_x(0.3)
//!     .set_scale(1.0);
//! ```
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::must_use_candidate)]
use glam::{Quat, Vec3};

use crate::scene::NodeHandle;
use crate::scene::graph::SceneGraph;
use crate::scene::transform::TransformUpdate;

/// Temporary mutable borrow of a scene node for chainable operations.
pub struct SceneNode<'a> {
    graph: &'a mut SceneGraph,
    handle: NodeHandle,
}

impl<'a> SceneNode<'a> {
    #[inline]
    pub fn new(graph: &'a mut SceneGraph, handle: NodeHandle) -> Self {
        Self { graph, handle }
    }

    /// Returns the underlying handle.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    #[inline]
    fn apply(self, update: TransformUpdate) -> Self {
        // A stale handle is the only failure; ignoring it is the contract.
        let _ = self.graph.set_local_transform(self.handle, update);
        self
    }

    fn rotation(&self) -> Option<Quat> {
        self.graph
            .node(self.handle)
            .map(|node| node.transform().rotation())
    }

    // -- Transform setters (chainable) --

    /// Sets the node's local position.
    #[inline]
    pub fn set_position(self, x: f32, y: f32, z: f32) -> Self {
        self.set_position_vec(Vec3::new(x, y, z))
    }

    /// Sets the node's local position from a Vec3.
    #[inline]
    pub fn set_position_vec(self, pos: Vec3) -> Self {
        self.apply(TransformUpdate::new().translation(pos))
    }

    /// Sets uniform scale.
    #[inline]
    pub fn set_scale(self, s: f32) -> Self {
        self.apply(TransformUpdate::new().scale(Vec3::splat(s)))
    }

    /// Sets non-uniform scale.
    #[inline]
    pub fn set_scale_xyz(self, x: f32, y: f32, z: f32) -> Self {
        self.apply(TransformUpdate::new().scale(Vec3::new(x, y, z)))
    }

    /// Sets rotation from a quaternion.
    #[inline]
    pub fn set_rotation(self, quat: Quat) -> Self {
        self.apply(TransformUpdate::new().rotation(quat))
    }

    /// Sets rotation from Euler angles (XYZ intrinsic order, radians).
    #[inline]
    pub fn set_rotation_euler(self, x: f32, y: f32, z: f32) -> Self {
        let quat = Quat::from_euler(glam::EulerRot::XYZ, x, y, z);
        self.set_rotation(quat)
    }

    /// Rotates around the Y axis by `angle` radians (cumulative).
    #[inline]
    pub fn rotate_y(self, angle: f32) -> Self {
        match self.rotation() {
            Some(current) => self.set_rotation(current * Quat::from_rotation_y(angle)),
            None => self,
        }
    }

    /// Rotates around the X axis by `angle` radians (cumulative).
    #[inline]
    pub fn rotate_x(self, angle: f32) -> Self {
        match self.rotation() {
            Some(current) => self.set_rotation(current * Quat::from_rotation_x(angle)),
            None => self,
        }
    }

    /// Queues the translation for the next update pass instead of applying it.
    #[inline]
    pub fn queue_position(self, pos: Vec3) -> Self {
        let _ = self
            .graph
            .queue_transform(self.handle, TransformUpdate::new().translation(pos));
        self
    }
}
