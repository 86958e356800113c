use glam::{Affine3A, Vec3};
use rustc_hash::FxHashMap;

use crate::errors::{Result, SceneError};
use crate::scene::{NodeHandle, SkinnedBoneKey};

/// CPU-side skinning data for a skin mesh.
///
/// Every vertex has exactly `influences_per_vertex` (bone index, weight)
/// pairs stored contiguously. Bone indices address the bone list of the
/// [`SkinSection`] that covers the vertex.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexSkinning {
    locations: Vec<Vec3>,
    influences_per_vertex: usize,
    bone_indices: Vec<u16>,
    bone_weights: Vec<f32>,
}

impl VertexSkinning {
    pub fn new(
        locations: Vec<Vec3>,
        influences_per_vertex: usize,
        bone_indices: Vec<u16>,
        bone_weights: Vec<f32>,
    ) -> Result<Self> {
        let expected = locations.len() * influences_per_vertex;
        if influences_per_vertex == 0 {
            return Err(SceneError::InvalidVertexSkinning(
                "at least one influence per vertex is required".to_string(),
            ));
        }
        if bone_indices.len() != expected || bone_weights.len() != expected {
            return Err(SceneError::InvalidVertexSkinning(format!(
                "{} vertices with {} influences need {} entries, got {} indices and {} weights",
                locations.len(),
                influences_per_vertex,
                expected,
                bone_indices.len(),
                bone_weights.len()
            )));
        }
        Ok(Self {
            locations,
            influences_per_vertex,
            bone_indices,
            bone_weights,
        })
    }

    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.locations.len()
    }

    #[inline]
    #[must_use]
    pub fn influences_per_vertex(&self) -> usize {
        self.influences_per_vertex
    }

    /// Rest (bind pose) location of a vertex.
    #[inline]
    #[must_use]
    pub fn location(&self, vertex: u32) -> Option<Vec3> {
        self.locations.get(vertex as usize).copied()
    }

    /// `(bone index, weight)` pairs of a vertex.
    pub fn influences(&self, vertex: u32) -> impl Iterator<Item = (usize, f32)> + '_ {
        let start = vertex as usize * self.influences_per_vertex;
        let end = (start + self.influences_per_vertex).min(self.bone_indices.len());
        let start = start.min(end);
        self.bone_indices[start..end]
            .iter()
            .zip(&self.bone_weights[start..end])
            .map(|(&index, &weight)| (usize::from(index), weight))
    }
}

/// A contiguous run of skin-mesh vertices driven by one ordered set of bones.
#[derive(Debug, Clone, Default)]
pub struct SkinSection {
    pub vertex_start: u32,
    pub vertex_count: u32,
    pub(crate) skinned_bones: Vec<SkinnedBoneKey>,
}

impl SkinSection {
    #[must_use]
    pub fn new(vertex_start: u32, vertex_count: u32) -> Self {
        Self {
            vertex_start,
            vertex_count,
            skinned_bones: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.skinned_bones.len()
    }

    #[inline]
    #[must_use]
    pub fn has_skeleton(&self) -> bool {
        !self.skinned_bones.is_empty()
    }

    /// Skinned bones in bone-index order.
    #[inline]
    #[must_use]
    pub fn skinned_bones(&self) -> &[SkinnedBoneKey] {
        &self.skinned_bones
    }

    #[inline]
    #[must_use]
    pub fn contains_vertex(&self, vertex: u32) -> bool {
        let end = u64::from(self.vertex_start) + u64::from(self.vertex_count);
        vertex >= self.vertex_start && u64::from(vertex) < end
    }
}

/// Skin-mesh data carried by [`NodeKind::SkinMesh`](crate::scene::NodeKind::SkinMesh).
#[derive(Debug, Clone, Default)]
pub struct SkinMesh {
    pub(crate) sections: Vec<SkinSection>,
    pub(crate) vertices: Option<VertexSkinning>,
    /// Deformed vertex locations, valid until the mesh or one of its bones moves.
    pub(crate) deformed_cache: FxHashMap<u32, Vec3>,
}

impl SkinMesh {
    #[must_use]
    pub fn new(vertices: Option<VertexSkinning>) -> Self {
        Self {
            sections: Vec::new(),
            vertices,
            deformed_cache: FxHashMap::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn sections(&self) -> &[SkinSection] {
        &self.sections
    }

    #[inline]
    #[must_use]
    pub fn vertices(&self) -> Option<&VertexSkinning> {
        self.vertices.as_ref()
    }

    #[must_use]
    pub fn has_skeleton(&self) -> bool {
        self.sections.iter().any(SkinSection::has_skeleton)
    }

    /// Index of the first section covering `vertex`.
    #[must_use]
    pub fn section_index_for_vertex(&self, vertex: u32) -> Option<usize> {
        self.sections.iter().position(|s| s.contains_vertex(vertex))
    }

    #[inline]
    pub(crate) fn clear_deformed_cache(&mut self) {
        self.deformed_cache.clear();
    }
}

/// The pairing of one bone with one skin mesh.
///
/// Caches the deformation matrix `Ms⁻¹ · Bs · Bsrp⁻¹ · Ms` that carries a
/// vertex from skin-mesh space through the bone's rest frame and current pose
/// back into skin-mesh space. It is registered as a listener on both nodes and
/// goes dirty whenever either is transformed.
///
/// # Degraded mode
///
/// When the bone or the skin mesh is destroyed the corresponding handle is
/// cleared and the skinned bone becomes inert: it keeps returning the last
/// matrix it computed and never recomputes again. This keeps a frame that is
/// mid-teardown from failing; it is not a functional state.
#[derive(Debug, Clone)]
pub struct SkinnedBone {
    pub(crate) bone: Option<NodeHandle>,
    /// Name of the bone at link time, used to re-link against another skeleton.
    pub(crate) bone_name: String,
    pub(crate) skin: Option<NodeHandle>,
    pub(crate) deformation: Affine3A,
    pub(crate) dirty: bool,
    pub(crate) recompute_count: u32,
}

impl SkinnedBone {
    pub(crate) fn new(skin: NodeHandle, bone: NodeHandle, bone_name: &str) -> Self {
        Self {
            bone: Some(bone),
            bone_name: bone_name.to_string(),
            skin: Some(skin),
            deformation: Affine3A::IDENTITY,
            dirty: true,
            recompute_count: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn bone(&self) -> Option<NodeHandle> {
        self.bone
    }

    #[inline]
    #[must_use]
    pub fn bone_name(&self) -> &str {
        &self.bone_name
    }

    #[inline]
    #[must_use]
    pub fn skin(&self) -> Option<NodeHandle> {
        self.skin
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// `true` once either dependency has been destroyed.
    #[inline]
    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.bone.is_none() || self.skin.is_none()
    }

    /// How many times the deformation matrix has been rebuilt.
    #[inline]
    #[must_use]
    pub fn recompute_count(&self) -> u32 {
        self.recompute_count
    }

    /// Last computed deformation matrix (identity before the first compute).
    #[inline]
    #[must_use]
    pub fn cached_deformation(&self) -> &Affine3A {
        &self.deformation
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn forget(&mut self, node: NodeHandle) {
        if self.skin == Some(node) {
            self.skin = None;
        }
        if self.bone == Some(node) {
            self.bone = None;
        }
    }

    pub(crate) fn store(&mut self, deformation: Affine3A) {
        self.deformation = deformation;
        self.dirty = false;
        self.recompute_count += 1;
    }
}

/// `Ms⁻¹ · Bs · Bsrp⁻¹ · Ms`.
///
/// Right to left: skin-mesh space into skeleton space, into the bone's rest
/// frame, out through the bone's current pose, back into skin-mesh space.
#[inline]
#[must_use]
pub fn deformation_matrix(
    skin_skeletal: &Affine3A,
    skin_skeletal_inverse: &Affine3A,
    bone_skeletal: &Affine3A,
    bone_rest_pose_inverted: &Affine3A,
) -> Affine3A {
    *skin_skeletal_inverse * *bone_skeletal * *bone_rest_pose_inverted * *skin_skeletal
}
