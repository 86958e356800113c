use glam::Affine3A;

/// Bone data carried by [`NodeKind::Bone`](crate::scene::NodeKind::Bone).
///
/// The inverted rest pose is the bone's skeletal matrix at bind time, inverted.
/// It does not exist until
/// [`SceneGraph::bind_rest_pose`](crate::scene::SceneGraph::bind_rest_pose)
/// has run, and binding again replaces it: every deformation computed
/// afterwards is relative to the new rest configuration.
#[derive(Debug, Clone, Default)]
pub struct Bone {
    rest_pose_inverted: Option<Affine3A>,
}

impl Bone {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.rest_pose_inverted.is_some()
    }

    /// The cached inverted rest pose, or `None` before binding.
    #[inline]
    #[must_use]
    pub fn rest_pose_inverted(&self) -> Option<&Affine3A> {
        self.rest_pose_inverted.as_ref()
    }

    pub(crate) fn cache_rest_pose(&mut self, skeletal_matrix: &Affine3A) {
        self.rest_pose_inverted = Some(skeletal_matrix.inverse());
    }
}

/// Whether the linear part of `m` is a pure rotation (orthonormal, no scale
/// or shear).
#[must_use]
pub fn is_rigid(m: &Affine3A) -> bool {
    const EPSILON: f32 = 1e-4;
    let x = m.matrix3.x_axis;
    let y = m.matrix3.y_axis;
    let z = m.matrix3.z_axis;
    (x.length_squared() - 1.0).abs() < EPSILON
        && (y.length_squared() - 1.0).abs() < EPSILON
        && (z.length_squared() - 1.0).abs() < EPSILON
        && x.dot(y).abs() < EPSILON
        && y.dot(z).abs() < EPSILON
        && z.dot(x).abs() < EPSILON
}
