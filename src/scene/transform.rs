use bitflags::bitflags;
use glam::{Affine3A, EulerRot, Quat, Vec3};

use crate::settings::GraphSettings;

bitflags! {
    /// Which cached matrices of a [`Transform`] are stale.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u8 {
        const LOCAL            = 1 << 0;
        const WORLD            = 1 << 1;
        const WORLD_INVERSE    = 1 << 2;
        const SKELETAL         = 1 << 3;
        const SKELETAL_INVERSE = 1 << 4;

        /// Everything that depends on the parent chain.
        const DERIVED = Self::WORLD.bits()
            | Self::WORLD_INVERSE.bits()
            | Self::SKELETAL.bits()
            | Self::SKELETAL_INVERSE.bits();
    }
}

/// A partial local-transform mutation.
///
/// Only the components that are `Some` are written; the others keep their
/// current value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransformUpdate {
    pub translation: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub scale: Option<Vec3>,
}

impl TransformUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn translation(mut self, translation: Vec3) -> Self {
        self.translation = Some(translation);
        self
    }

    #[must_use]
    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = Some(rotation);
        self
    }

    #[must_use]
    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Folds a later update into this one; components set in `later` win.
    pub fn merge(&mut self, later: TransformUpdate) {
        if later.translation.is_some() {
            self.translation = later.translation;
        }
        if later.rotation.is_some() {
            self.rotation = later.rotation;
        }
        if later.scale.is_some() {
            self.scale = later.scale;
        }
    }

    /// Returns `true` when no component is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.translation.is_none() && self.rotation.is_none() && self.scale.is_none()
    }
}

/// Transform component.
///
/// Holds the local TRS of a node together with the matrices derived from it
/// and the dirty flags guarding each cache. The TRS is read-only from outside
/// the crate: every write goes through the scene graph so that dependents are
/// notified.
#[derive(Debug, Clone)]
pub struct Transform {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,

    pub(crate) local_matrix: Affine3A,
    pub(crate) world_matrix: Affine3A,
    pub(crate) world_matrix_inverse: Affine3A,
    pub(crate) skeletal_matrix: Affine3A,
    pub(crate) skeletal_matrix_inverse: Affine3A,

    pub(crate) dirty: DirtyFlags,
}

impl Transform {
    /// Identity transform with every cache dirty, forcing the first compute.
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,

            local_matrix: Affine3A::IDENTITY,
            world_matrix: Affine3A::IDENTITY,
            world_matrix_inverse: Affine3A::IDENTITY,
            skeletal_matrix: Affine3A::IDENTITY,
            skeletal_matrix_inverse: Affine3A::IDENTITY,

            dirty: DirtyFlags::all(),
        }
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    #[must_use]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    #[inline]
    #[must_use]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Current rotation as XYZ Euler angles, in radians.
    #[must_use]
    pub fn rotation_euler(&self) -> Vec3 {
        let (x, y, z) = self.rotation.to_euler(EulerRot::XYZ);
        Vec3::new(x, y, z)
    }

    /// Returns `true` while the composed matrix needs a recompute.
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.contains(DirtyFlags::WORLD)
    }

    #[inline]
    #[must_use]
    pub fn dirty_flags(&self) -> DirtyFlags {
        self.dirty
    }

    /// Writes the supplied components. Does not touch the derived caches; the
    /// graph marks those and notifies listeners.
    pub(crate) fn apply(&mut self, update: &TransformUpdate) {
        if let Some(translation) = update.translation {
            self.position = translation;
        }
        if let Some(rotation) = update.rotation {
            self.rotation = rotation;
        }
        if let Some(scale) = update.scale {
            self.scale = scale;
        }
        self.dirty |= DirtyFlags::LOCAL;
    }

    /// Marks every cache that depends on the parent chain stale.
    #[inline]
    pub(crate) fn invalidate(&mut self) {
        self.dirty |= DirtyFlags::DERIVED;
    }

    /// Rebuilds the local matrix if needed and returns it.
    ///
    /// Applied to a point the matrix scales first, then rotates, then
    /// translates.
    pub(crate) fn refresh_local_matrix(&mut self, settings: &GraphSettings) -> Affine3A {
        if self.dirty.contains(DirtyFlags::LOCAL) {
            let scale = Vec3::new(
                settings.clamp_scale_axis(self.scale.x),
                settings.clamp_scale_axis(self.scale.y),
                settings.clamp_scale_axis(self.scale.z),
            );
            self.local_matrix =
                Affine3A::from_scale_rotation_translation(scale, self.rotation, self.position);
            self.dirty.remove(DirtyFlags::LOCAL);
        }
        self.local_matrix
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
