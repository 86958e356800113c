//! Scene Graph Settings
//!
//! Tunables for a [`SceneGraph`](crate::scene::SceneGraph), passed once at
//! construction.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use armature::{GraphSettings, SceneGraph};
//!
//! // Defaults: lazy matrices, nothing recomputed until somebody asks.
//! let graph = SceneGraph::new();
//!
//! // Refresh every composed matrix at the end of each update pass.
//! let graph = SceneGraph::with_settings(GraphSettings {
//!     eager_world_refresh: true,
//!     ..Default::default()
//! });
//! ```

/// Smallest magnitude allowed for a scale component.
pub const DEFAULT_MIN_SCALE: f32 = 1.0e-9;

/// Configuration for a scene graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphSettings {
    /// Scale components whose magnitude falls below this value are pushed out
    /// to `±min_scale` when the local matrix is built, keeping every local
    /// matrix invertible.
    pub min_scale: f32,

    /// When `true`, [`SceneGraph::update`](crate::scene::SceneGraph::update)
    /// recomputes every dirty composed matrix top-down after applying the
    /// queued mutations. When `false` (the default) matrices are only built
    /// on demand.
    pub eager_world_refresh: bool,

    /// Initial capacity reserved for the node arena.
    pub node_capacity: usize,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            min_scale: DEFAULT_MIN_SCALE,
            eager_world_refresh: false,
            node_capacity: 64,
        }
    }
}

impl GraphSettings {
    /// Clamps a single scale component away from zero, preserving its sign.
    #[inline]
    #[must_use]
    pub fn clamp_scale_axis(&self, value: f32) -> f32 {
        if value > self.min_scale || value < -self.min_scale {
            value
        } else if value >= 0.0 {
            self.min_scale
        } else {
            -self.min_scale
        }
    }
}
