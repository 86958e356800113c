//! The scene graph arena.
//!
//! [`SceneGraph`] owns every node, skinned bone and watch, and is the only
//! place where transforms are mutated. That gives one choke point for the
//! rule the whole crate depends on: **every mutation marks the affected
//! subtree dirty and notifies its listeners before anything is recomputed.**
//!
//! Matrices are pulled lazily. Asking a node for its composed matrix walks up
//! to the nearest clean ancestor and rebuilds the dirty part of the chain
//! top-down. Dirty marking is eager and covers the whole subtree, so a clean
//! node always has clean ancestors.

use glam::{Affine3A, Vec3};
use slotmap::{SecondaryMap, SlotMap};
use smallvec::SmallVec;

use crate::errors::{Result, SceneError};
use crate::scene::bone::{Bone, is_rigid};
use crate::scene::listeners::Subscriber;
use crate::scene::node::{Node, NodeKind};
use crate::scene::skin::{SkinMesh, SkinSection, SkinnedBone, VertexSkinning, deformation_matrix};
use crate::scene::transform::{DirtyFlags, TransformUpdate};
use crate::scene::watch::{TransformWatch, WatchMode};
use crate::scene::wrapper::SceneNode;
use crate::scene::{NodeHandle, SkinnedBoneKey, WatchKey};
use crate::settings::GraphSettings;

type Chain = SmallVec<[NodeHandle; 16]>;

/// Owning arena for a tree of transform nodes and the objects observing them.
pub struct SceneGraph {
    pub(crate) nodes: SlotMap<NodeHandle, Node>,
    pub(crate) roots: Vec<NodeHandle>,

    pub(crate) skinned_bones: SlotMap<SkinnedBoneKey, SkinnedBone>,
    pub(crate) watches: SlotMap<WatchKey, TransformWatch>,

    /// Local-transform mutations queued for the next update pass.
    pub(crate) pending: SecondaryMap<NodeHandle, TransformUpdate>,

    pub(crate) settings: GraphSettings,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(GraphSettings::default())
    }

    #[must_use]
    pub fn with_settings(settings: GraphSettings) -> Self {
        Self {
            nodes: SlotMap::with_capacity_and_key(settings.node_capacity),
            roots: Vec::new(),
            skinned_bones: SlotMap::with_key(),
            watches: SlotMap::with_key(),
            pending: SecondaryMap::new(),
            settings,
        }
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    // ========================================================================
    // Node access
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(handle)
    }

    /// Chainable mutation wrapper for one node.
    #[inline]
    pub fn node_mut(&mut self, handle: NodeHandle) -> SceneNode<'_> {
        SceneNode::new(self, handle)
    }

    /// Nodes without a parent, in creation/detach order.
    #[inline]
    #[must_use]
    pub fn roots(&self) -> &[NodeHandle] {
        &self.roots
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &Node)> {
        self.nodes.iter()
    }

    fn require(&self, handle: NodeHandle) -> Result<&Node> {
        self.nodes.get(handle).ok_or(SceneError::NodeNotFound(handle))
    }

    /// `root` and all of its descendants, parents before children.
    #[must_use]
    pub fn subtree(&self, root: NodeHandle) -> Vec<NodeHandle> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// First node named `name` in a pre-order walk of `root`'s subtree.
    #[must_use]
    pub fn find_named(&self, root: NodeHandle, name: &str) -> Option<NodeHandle> {
        self.subtree(root)
            .into_iter()
            .find(|&h| self.nodes.get(h).is_some_and(|n| n.name == name))
    }

    /// Returns `true` if `ancestor` is a strict ancestor of `node`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeHandle, node: NodeHandle) -> bool {
        let mut cursor = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes.get(current).and_then(|n| n.parent);
        }
        false
    }

    /// Nearest strict ancestor of kind [`NodeKind::SkeletonRoot`].
    #[must_use]
    pub fn skeleton_root_of(&self, node: NodeHandle) -> Option<NodeHandle> {
        let mut cursor = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(current) = cursor {
            let parent = self.nodes.get(current)?;
            if parent.kind.is_skeleton_root() {
                return Some(current);
            }
            cursor = parent.parent;
        }
        None
    }

    // ========================================================================
    // Construction & hierarchy
    // ========================================================================

    /// Adds a new root node.
    pub fn create_node(&mut self, name: &str, kind: NodeKind) -> NodeHandle {
        let handle = self.nodes.insert(Node::new(name, kind));
        self.roots.push(handle);
        handle
    }

    pub fn create_group(&mut self, name: &str) -> NodeHandle {
        self.create_node(name, NodeKind::Group)
    }

    pub fn create_skeleton_root(&mut self, name: &str) -> NodeHandle {
        self.create_node(name, NodeKind::SkeletonRoot)
    }

    pub fn create_bone(&mut self, name: &str) -> NodeHandle {
        self.create_node(name, NodeKind::Bone(Bone::new()))
    }

    pub fn create_skin_mesh(&mut self, name: &str, vertices: Option<VertexSkinning>) -> NodeHandle {
        self.create_node(name, NodeKind::SkinMesh(SkinMesh::new(vertices)))
    }

    /// Makes `child` a child of `parent`, detaching it from wherever it was.
    ///
    /// The child's subtree is marked dirty and notified: its composed and
    /// skeletal matrices now hang off a different chain.
    pub fn attach(&mut self, child: NodeHandle, parent: NodeHandle) -> Result<()> {
        self.require(child)?;
        self.require(parent)?;
        if child == parent || self.is_ancestor(child, parent) {
            return Err(SceneError::HierarchyCycle { child, parent });
        }
        if self.nodes.get(child).and_then(|n| n.parent) == Some(parent) {
            return Ok(());
        }

        self.unlink(child);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = Some(parent);
        }
        self.mark_dirty_subtree(child)
    }

    /// Turns `child` into a root node.
    pub fn detach(&mut self, child: NodeHandle) -> Result<()> {
        if self.require(child)?.parent.is_none() {
            return Ok(());
        }
        self.unlink(child);
        self.roots.push(child);
        self.mark_dirty_subtree(child)
    }

    /// Removes `handle` from its parent's child list (or from the roots).
    fn unlink(&mut self, handle: NodeHandle) {
        let parent = self.nodes.get_mut(handle).and_then(|n| n.parent.take());
        match parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(parent)
                    && let Some(pos) = p.children.iter().position(|&x| x == handle)
                {
                    p.children.remove(pos);
                }
            }
            None => {
                if let Some(pos) = self.roots.iter().position(|&x| x == handle) {
                    self.roots.remove(pos);
                }
            }
        }
    }

    /// Destroys `handle` and its whole subtree.
    ///
    /// Descendants go first. Each node tells its listeners it is being
    /// destroyed, so skinned bones and watches drop their handles, before it
    /// leaves the arena. Skinned bones owned by a destroyed skin mesh are
    /// destroyed with it and deregister from their bones.
    pub fn remove_node(&mut self, handle: NodeHandle) -> Result<()> {
        self.require(handle)?;
        let subtree = self.subtree(handle);
        for &current in subtree.iter().rev() {
            self.destroy_node(current);
        }
        Ok(())
    }

    fn destroy_node(&mut self, handle: NodeHandle) {
        self.broadcast_destroyed(handle);
        self.unlink(handle);
        self.pending.remove(handle);

        let Some(node) = self.nodes.remove(handle) else {
            return;
        };
        if let NodeKind::SkinMesh(mesh) = node.kind {
            for key in mesh.sections.into_iter().flat_map(|s| s.skinned_bones) {
                self.destroy_skinned_bone(key);
            }
        }
        log::debug!("Removed node '{}' ({:?})", node.name, handle);
    }

    // ========================================================================
    // Transform mutation
    // ========================================================================

    /// Writes the supplied TRS components of a node.
    ///
    /// The node and every descendant are marked dirty and their listeners are
    /// notified before this returns, whether or not the values changed.
    pub fn set_local_transform(&mut self, handle: NodeHandle, update: TransformUpdate) -> Result<()> {
        let node = self
            .nodes
            .get_mut(handle)
            .ok_or(SceneError::NodeNotFound(handle))?;
        node.transform.apply(&update);
        self.mark_dirty_subtree(handle)
    }

    /// Invalidates the derived matrices of `handle` and all descendants and
    /// notifies each node's listeners, parents before children.
    pub fn mark_dirty_subtree(&mut self, handle: NodeHandle) -> Result<()> {
        self.require(handle)?;
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current) else {
                continue;
            };
            node.transform.invalidate();
            if let NodeKind::SkinMesh(mesh) = &mut node.kind {
                mesh.clear_deformed_cache();
            }
            stack.extend(node.children.iter().rev().copied());
            self.broadcast_transformed(current);
        }
        Ok(())
    }

    // ========================================================================
    // Matrix queries (lazy)
    // ========================================================================

    /// Local matrix built from the node's TRS.
    pub fn local_matrix(&mut self, handle: NodeHandle) -> Result<Affine3A> {
        let settings = self.settings;
        let node = self
            .nodes
            .get_mut(handle)
            .ok_or(SceneError::NodeNotFound(handle))?;
        Ok(node.transform.refresh_local_matrix(&settings))
    }

    /// The node's world matrix: `parent.composed * local`, identity above the
    /// roots. Recomputed only when dirty.
    pub fn composed_matrix(&mut self, handle: NodeHandle) -> Result<Affine3A> {
        self.require(handle)?;

        let mut chain = Chain::new();
        let mut cursor = Some(handle);
        while let Some(current) = cursor {
            let Some(node) = self.nodes.get(current) else {
                break;
            };
            if !node.transform.dirty.contains(DirtyFlags::WORLD) {
                break;
            }
            chain.push(current);
            cursor = node.parent;
        }

        let settings = self.settings;
        for &current in chain.iter().rev() {
            let parent_world = self
                .nodes
                .get(current)
                .and_then(|n| n.parent)
                .and_then(|p| self.nodes.get(p))
                .map_or(Affine3A::IDENTITY, |p| p.transform.world_matrix);

            if let Some(node) = self.nodes.get_mut(current) {
                let local = node.transform.refresh_local_matrix(&settings);
                node.transform.world_matrix = parent_world * local;
                node.transform.dirty.remove(DirtyFlags::WORLD);
                log::trace!("Recomputed world matrix of '{}'", node.name);
            }
        }

        Ok(self.require(handle)?.transform.world_matrix)
    }

    /// Inverse of [`composed_matrix`](Self::composed_matrix), cached alongside it.
    pub fn composed_matrix_inverse(&mut self, handle: NodeHandle) -> Result<Affine3A> {
        let world = self.composed_matrix(handle)?;
        let node = self
            .nodes
            .get_mut(handle)
            .ok_or(SceneError::NodeNotFound(handle))?;
        if node.transform.dirty.contains(DirtyFlags::WORLD_INVERSE) {
            node.transform.world_matrix_inverse = world.inverse();
            node.transform.dirty.remove(DirtyFlags::WORLD_INVERSE);
        }
        Ok(node.transform.world_matrix_inverse)
    }

    /// The node's transform relative to its skeleton root.
    ///
    /// Local matrices are composed up to, but not including, the nearest
    /// ancestor of kind [`NodeKind::SkeletonRoot`]. A skeleton root is the
    /// identity in its own space. A node with no skeleton root above it
    /// composes all the way up, i.e. uses the world origin.
    pub fn skeletal_matrix(&mut self, handle: NodeHandle) -> Result<Affine3A> {
        if self.require(handle)?.kind.is_skeleton_root() {
            return Ok(Affine3A::IDENTITY);
        }

        let mut chain = Chain::new();
        let mut cursor = Some(handle);
        while let Some(current) = cursor {
            let Some(node) = self.nodes.get(current) else {
                break;
            };
            if !node.transform.dirty.contains(DirtyFlags::SKELETAL) {
                break;
            }
            chain.push(current);
            cursor = node.parent.filter(|&p| !self.is_skeleton_root(p));
        }

        let settings = self.settings;
        for &current in chain.iter().rev() {
            let base = self
                .nodes
                .get(current)
                .and_then(|n| n.parent)
                .and_then(|p| self.nodes.get(p))
                .filter(|p| !p.kind.is_skeleton_root())
                .map_or(Affine3A::IDENTITY, |p| p.transform.skeletal_matrix);

            if let Some(node) = self.nodes.get_mut(current) {
                let local = node.transform.refresh_local_matrix(&settings);
                node.transform.skeletal_matrix = base * local;
                node.transform.dirty.remove(DirtyFlags::SKELETAL);
                log::trace!("Recomputed skeletal matrix of '{}'", node.name);
            }
        }

        Ok(self.require(handle)?.transform.skeletal_matrix)
    }

    /// Inverse of [`skeletal_matrix`](Self::skeletal_matrix), cached alongside it.
    pub fn skeletal_matrix_inverse(&mut self, handle: NodeHandle) -> Result<Affine3A> {
        let skeletal = self.skeletal_matrix(handle)?;
        let node = self
            .nodes
            .get_mut(handle)
            .ok_or(SceneError::NodeNotFound(handle))?;
        if node.kind.is_skeleton_root() {
            return Ok(Affine3A::IDENTITY);
        }
        if node.transform.dirty.contains(DirtyFlags::SKELETAL_INVERSE) {
            node.transform.skeletal_matrix_inverse = skeletal.inverse();
            node.transform.dirty.remove(DirtyFlags::SKELETAL_INVERSE);
        }
        Ok(node.transform.skeletal_matrix_inverse)
    }

    fn is_skeleton_root(&self, handle: NodeHandle) -> bool {
        self.nodes.get(handle).is_some_and(|n| n.kind.is_skeleton_root())
    }

    // ========================================================================
    // Bones
    // ========================================================================

    /// Captures the bone's current skeletal matrix as its rest pose.
    ///
    /// Call once the skeleton is assembled and posed neutrally, before any
    /// animated pose is applied. Calling it again is a deliberate re-bind:
    /// the new pose becomes the rest pose and every skinned bone using this
    /// bone is dirtied.
    pub fn bind_rest_pose(&mut self, bone: NodeHandle) -> Result<()> {
        if self.require(bone)?.kind.as_bone().is_none() {
            return Err(SceneError::NotABone(bone));
        }
        if self.skeleton_root_of(bone).is_none() {
            log::debug!("Bone {bone:?} has no skeleton root; binding against the world origin");
        }
        let skeletal = self.skeletal_matrix(bone)?;
        if let Some(node) = self.nodes.get_mut(bone)
            && let NodeKind::Bone(data) = &mut node.kind
        {
            data.cache_rest_pose(&skeletal);
            log::debug!("Bound rest pose of bone '{}'", node.name);
        }
        self.broadcast_transformed(bone);
        Ok(())
    }

    /// Binds every bone in `root`'s subtree. Returns how many were bound.
    pub fn bind_rest_pose_subtree(&mut self, root: NodeHandle) -> Result<usize> {
        self.require(root)?;
        let bones: Vec<_> = self
            .subtree(root)
            .into_iter()
            .filter(|&h| self.nodes.get(h).is_some_and(|n| n.kind.as_bone().is_some()))
            .collect();
        for &bone in &bones {
            self.bind_rest_pose(bone)?;
        }
        Ok(bones.len())
    }

    /// The bone's cached inverted rest pose.
    pub fn rest_pose_inverted(&self, bone: NodeHandle) -> Result<Affine3A> {
        let data = self
            .require(bone)?
            .kind
            .as_bone()
            .ok_or(SceneError::NotABone(bone))?;
        data.rest_pose_inverted()
            .copied()
            .ok_or(SceneError::RestPoseUnbound(bone))
    }

    /// Resets every bone under `root` to unit scale.
    pub fn ensure_rigid_skeleton(&mut self, root: NodeHandle) -> Result<()> {
        self.require(root)?;
        for handle in self.subtree(root) {
            if self.nodes.get(handle).is_some_and(|n| n.kind.as_bone().is_some()) {
                self.set_local_transform(handle, TransformUpdate::new().scale(Vec3::ONE))?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Skin meshes & skinned bones
    // ========================================================================

    fn skin_mesh(&self, skin: NodeHandle) -> Result<&SkinMesh> {
        self.require(skin)?
            .kind
            .as_skin_mesh()
            .ok_or(SceneError::NotASkinMesh(skin))
    }

    fn skin_mesh_mut(&mut self, skin: NodeHandle) -> Result<&mut SkinMesh> {
        match self.nodes.get_mut(skin) {
            Some(Node {
                kind: NodeKind::SkinMesh(mesh),
                ..
            }) => Ok(mesh),
            Some(_) => Err(SceneError::NotASkinMesh(skin)),
            None => Err(SceneError::NodeNotFound(skin)),
        }
    }

    /// Adds a skin section covering `vertex_count` vertices from
    /// `vertex_start`. Returns its index.
    pub fn add_skin_section(&mut self, skin: NodeHandle, vertex_start: u32, vertex_count: u32) -> Result<usize> {
        let mesh = self.skin_mesh_mut(skin)?;
        mesh.sections.push(SkinSection::new(vertex_start, vertex_count));
        Ok(mesh.sections.len() - 1)
    }

    /// Links `bone` to a section of `skin`, creating the skinned bone that
    /// caches their deformation matrix. The new skinned bone takes the next
    /// bone index of the section.
    pub fn add_skin_bone(&mut self, skin: NodeHandle, section: usize, bone: NodeHandle) -> Result<SkinnedBoneKey> {
        if self.require(bone)?.kind.as_bone().is_none() {
            return Err(SceneError::NotABone(bone));
        }
        if section >= self.skin_mesh(skin)?.sections.len() {
            return Err(SceneError::SkinSectionOutOfBounds { node: skin, index: section });
        }

        let key = self.link_skinned_bone(skin, bone);
        let mesh = self.skin_mesh_mut(skin)?;
        if let Some(s) = mesh.sections.get_mut(section) {
            s.skinned_bones.push(key);
        }
        mesh.clear_deformed_cache();
        Ok(key)
    }

    /// Re-links every section of `skin` to the bones of the same names
    /// beneath `root`, keeping each section's bone-index order.
    ///
    /// Every name is resolved before anything changes, so a failed lookup
    /// leaves the skin mesh as it was. The old skinned bones are destroyed and
    /// deregister from their bones; the new ones start dirty.
    pub fn reattach_bones_from(&mut self, skin: NodeHandle, root: NodeHandle) -> Result<()> {
        self.require(root)?;
        let mut plan: Vec<Vec<(SkinnedBoneKey, NodeHandle)>> = Vec::new();
        for section in &self.skin_mesh(skin)?.sections {
            let mut links = Vec::with_capacity(section.bone_count());
            for &old in &section.skinned_bones {
                let name = self
                    .skinned_bones
                    .get(old)
                    .map(SkinnedBone::bone_name)
                    .ok_or(SceneError::SkinnedBoneNotFound(old))?;
                let bone = self
                    .find_named(root, name)
                    .ok_or_else(|| SceneError::NamedBoneNotFound { root, name: name.to_string() })?;
                if self.require(bone)?.kind.as_bone().is_none() {
                    return Err(SceneError::NotABone(bone));
                }
                links.push((old, bone));
            }
            plan.push(links);
        }

        for (index, links) in plan.into_iter().enumerate() {
            let mut keys = Vec::with_capacity(links.len());
            for (old, bone) in links {
                self.destroy_skinned_bone(old);
                keys.push(self.link_skinned_bone(skin, bone));
            }
            if let Some(section) = self.skin_mesh_mut(skin)?.sections.get_mut(index) {
                section.skinned_bones = keys;
            }
        }
        self.skin_mesh_mut(skin)?.clear_deformed_cache();
        log::debug!("Reattached bones of skin mesh {skin:?} from {root:?}");
        Ok(())
    }

    /// Creates a skinned bone and registers it on both of its dependencies.
    fn link_skinned_bone(&mut self, skin: NodeHandle, bone: NodeHandle) -> SkinnedBoneKey {
        let name = self.nodes.get(bone).map(|n| n.name.clone()).unwrap_or_default();
        let key = self.skinned_bones.insert(SkinnedBone::new(skin, bone, &name));
        let subscriber = Subscriber::SkinnedBone(key);
        for dependency in [bone, skin] {
            if let Some(node) = self.nodes.get_mut(dependency) {
                node.listeners.add(subscriber);
            }
        }
        key
    }

    /// Removes a skin section, destroying its skinned bones.
    pub fn remove_skin_section(&mut self, skin: NodeHandle, section: usize) -> Result<()> {
        let mesh = self.skin_mesh_mut(skin)?;
        if section >= mesh.sections.len() {
            return Err(SceneError::SkinSectionOutOfBounds { node: skin, index: section });
        }
        let removed = mesh.sections.remove(section);
        mesh.clear_deformed_cache();
        for key in removed.skinned_bones {
            self.destroy_skinned_bone(key);
        }
        Ok(())
    }

    /// Read access to a skin mesh's sections.
    pub fn skin_sections(&self, skin: NodeHandle) -> Result<&[SkinSection]> {
        Ok(self.skin_mesh(skin)?.sections())
    }

    /// Index of the section covering `vertex`, if any.
    pub fn skin_section_for_vertex(&self, skin: NodeHandle, vertex: u32) -> Result<Option<usize>> {
        Ok(self.skin_mesh(skin)?.section_index_for_vertex(vertex))
    }

    /// Skinned bone at `index` of a section.
    pub fn skinned_bone_at(&self, skin: NodeHandle, section: usize, index: usize) -> Result<SkinnedBoneKey> {
        let s = self
            .skin_mesh(skin)?
            .sections
            .get(section)
            .ok_or(SceneError::SkinSectionOutOfBounds { node: skin, index: section })?;
        s.skinned_bones
            .get(index)
            .copied()
            .ok_or(SceneError::BoneIndexOutOfBounds { index, bone_count: s.bone_count() })
    }

    #[inline]
    #[must_use]
    pub fn skinned_bone(&self, key: SkinnedBoneKey) -> Option<&SkinnedBone> {
        self.skinned_bones.get(key)
    }

    fn destroy_skinned_bone(&mut self, key: SkinnedBoneKey) {
        let Some(skinned) = self.skinned_bones.remove(key) else {
            return;
        };
        let subscriber = Subscriber::SkinnedBone(key);
        for dependency in [skinned.bone, skinned.skin].into_iter().flatten() {
            if let Some(node) = self.nodes.get_mut(dependency) {
                node.listeners.remove(subscriber);
            }
        }
    }

    /// The deformation matrix `Ms⁻¹ · Bs · Bsrp⁻¹ · Ms` of a skinned bone.
    ///
    /// Recomputed only when the bone or the skin mesh has been transformed
    /// since the last call. An inert skinned bone (one whose bone or skin mesh
    /// was destroyed) returns its last matrix without recomputing.
    pub fn deformation_matrix(&mut self, key: SkinnedBoneKey) -> Result<Affine3A> {
        let skinned = self
            .skinned_bones
            .get(key)
            .ok_or(SceneError::SkinnedBoneNotFound(key))?;
        if !skinned.dirty {
            return Ok(skinned.deformation);
        }
        let (Some(bone), Some(skin)) = (skinned.bone, skinned.skin) else {
            return Ok(skinned.deformation);
        };

        let rest_pose_inverted = self.rest_pose_inverted(bone)?;
        let skin_skeletal = self.skeletal_matrix(skin)?;
        let skin_skeletal_inverse = self.skeletal_matrix_inverse(skin)?;
        let bone_skeletal = self.skeletal_matrix(bone)?;
        let deformation = deformation_matrix(
            &skin_skeletal,
            &skin_skeletal_inverse,
            &bone_skeletal,
            &rest_pose_inverted,
        );

        let skinned = self
            .skinned_bones
            .get_mut(key)
            .ok_or(SceneError::SkinnedBoneNotFound(key))?;
        skinned.store(deformation);
        log::trace!("Recomputed deformation matrix {key:?}");
        Ok(deformation)
    }

    /// Location of a skin-mesh vertex under the current pose, in skin-mesh
    /// space: the weighted sum of each influencing bone's deformation applied
    /// to the rest location.
    pub fn deformed_vertex_location(&mut self, skin: NodeHandle, vertex: u32) -> Result<Vec3> {
        let mesh = self.skin_mesh(skin)?;
        if let Some(&cached) = mesh.deformed_cache.get(&vertex) {
            return Ok(cached);
        }
        let out_of_bounds = SceneError::VertexOutOfBounds { node: skin, vertex };
        let vertices = mesh.vertices.as_ref().ok_or_else(|| out_of_bounds.clone())?;
        let rest = vertices.location(vertex).ok_or_else(|| out_of_bounds.clone())?;
        let section = mesh.section_index_for_vertex(vertex).ok_or(out_of_bounds)?;
        let bones = mesh.sections[section].skinned_bones.clone();
        let influences: SmallVec<[(usize, f32); 4]> = vertices.influences(vertex).collect();

        let mut deformed = Vec3::ZERO;
        for (index, weight) in influences {
            // Padding slots carry zero weight and may hold any index.
            if weight == 0.0 {
                continue;
            }
            let key = bones
                .get(index)
                .copied()
                .ok_or(SceneError::BoneIndexOutOfBounds { index, bone_count: bones.len() })?;
            let deformation = self.deformation_matrix(key)?;
            deformed += deformation.transform_point3(rest) * weight;
        }

        self.skin_mesh_mut(skin)?.deformed_cache.insert(vertex, deformed);
        Ok(deformed)
    }

    /// `true` when the skin mesh has at least one bone and every live bone's
    /// skeletal matrix is free of scale and shear.
    pub fn has_rigid_skeleton(&mut self, skin: NodeHandle) -> Result<bool> {
        let bones: Vec<NodeHandle> = self
            .skin_mesh(skin)?
            .sections
            .iter()
            .flat_map(|s| s.skinned_bones.iter())
            .filter_map(|&key| self.skinned_bones.get(key).and_then(SkinnedBone::bone))
            .collect();
        if bones.is_empty() {
            return Ok(false);
        }
        for bone in bones {
            if !is_rigid(&self.skeletal_matrix(bone)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Registers a subscriber on a node. Returns `false` if it was already
    /// registered there.
    ///
    /// A skinned bone may only listen to its own bone and skin mesh, the two
    /// nodes it deregisters from when it is destroyed. A watch may listen to
    /// any number of nodes.
    pub fn add_listener(&mut self, node: NodeHandle, subscriber: Subscriber) -> Result<bool> {
        self.require(node)?;
        match subscriber {
            Subscriber::SkinnedBone(key) => {
                let skinned = self
                    .skinned_bones
                    .get(key)
                    .ok_or(SceneError::SkinnedBoneNotFound(key))?;
                if skinned.bone != Some(node) && skinned.skin != Some(node) {
                    return Err(SceneError::UnrelatedSkinnedBone { key, node });
                }
            }
            Subscriber::Watch(key) => {
                self.watches
                    .get_mut(key)
                    .ok_or(SceneError::WatchNotFound(key))?
                    .register(node);
            }
        }
        let added = self
            .nodes
            .get_mut(node)
            .is_some_and(|n| n.listeners.add(subscriber));
        Ok(added)
    }

    /// Deregisters a subscriber from a node. Safe to call while the node is
    /// notifying.
    pub fn remove_listener(&mut self, node: NodeHandle, subscriber: Subscriber) -> Result<bool> {
        let removed = self
            .nodes
            .get_mut(node)
            .ok_or(SceneError::NodeNotFound(node))?
            .listeners
            .remove(subscriber);
        if let Subscriber::Watch(key) = subscriber
            && let Some(watch) = self.watches.get_mut(key)
        {
            watch.deregister(node);
        }
        Ok(removed)
    }

    /// Sends a transform-changed notification to the node's listeners.
    pub fn notify_transformed(&mut self, node: NodeHandle) -> Result<()> {
        self.require(node)?;
        self.broadcast_transformed(node);
        Ok(())
    }

    /// Dispatches to a snapshot of the registry, skipping subscribers that an
    /// earlier callback in the same pass removed.
    fn broadcast_transformed(&mut self, source: NodeHandle) {
        let Some(node) = self.nodes.get(source) else {
            return;
        };
        if node.listeners.is_empty() {
            return;
        }
        for subscriber in node.listeners.snapshot() {
            let still_registered = self
                .nodes
                .get(source)
                .is_some_and(|n| n.listeners.contains(subscriber));
            if still_registered {
                self.dispatch_transformed(source, subscriber);
            }
        }
    }

    fn dispatch_transformed(&mut self, source: NodeHandle, subscriber: Subscriber) {
        match subscriber {
            Subscriber::SkinnedBone(key) => {
                let Some(skinned) = self.skinned_bones.get_mut(key) else {
                    log::warn!("Dropping stale skinned bone listener {key:?} on {source:?}");
                    self.drop_listener(source, subscriber);
                    return;
                };
                skinned.mark_dirty();
                if skinned.bone == Some(source)
                    && let Some(skin) = skinned.skin
                    && let Ok(mesh) = self.skin_mesh_mut(skin)
                {
                    mesh.clear_deformed_cache();
                }
            }
            Subscriber::Watch(key) => {
                let Some(watch) = self.watches.get_mut(key) else {
                    log::warn!("Dropping stale watch listener {key:?} on {source:?}");
                    self.drop_listener(source, subscriber);
                    return;
                };
                watch.transformed += 1;
                if watch.mode == WatchMode::Once {
                    let registrations = std::mem::take(&mut watch.registrations);
                    for node in registrations {
                        self.drop_listener(node, subscriber);
                    }
                }
            }
        }
    }

    /// Sends a destruction notification to the node's listeners and empties
    /// its registry. [`remove_node`](Self::remove_node) does this for every
    /// node it frees.
    pub fn notify_destroyed(&mut self, node: NodeHandle) -> Result<()> {
        self.require(node)?;
        self.broadcast_destroyed(node);
        Ok(())
    }

    fn broadcast_destroyed(&mut self, source: NodeHandle) {
        let Some(node) = self.nodes.get_mut(source) else {
            return;
        };
        for subscriber in node.listeners.take() {
            match subscriber {
                Subscriber::SkinnedBone(key) => {
                    if let Some(skinned) = self.skinned_bones.get_mut(key) {
                        skinned.forget(source);
                        log::debug!("Skinned bone {key:?} lost {source:?}; now inert");
                    }
                }
                Subscriber::Watch(key) => {
                    if let Some(watch) = self.watches.get_mut(key) {
                        watch.lose(source);
                    }
                }
            }
        }
    }

    fn drop_listener(&mut self, node: NodeHandle, subscriber: Subscriber) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.listeners.remove(subscriber);
        }
    }

    // ========================================================================
    // Watches
    // ========================================================================

    /// Starts counting transform notifications from `node`.
    pub fn watch(&mut self, node: NodeHandle, mode: WatchMode) -> Result<WatchKey> {
        self.require(node)?;
        let key = self.watches.insert(TransformWatch::new(node, mode));
        if let Some(n) = self.nodes.get_mut(node) {
            n.listeners.add(Subscriber::Watch(key));
        }
        Ok(key)
    }

    #[inline]
    #[must_use]
    pub fn watch_state(&self, key: WatchKey) -> Option<&TransformWatch> {
        self.watches.get(key)
    }

    /// Zeroes a watch's notification counter.
    pub fn reset_watch(&mut self, key: WatchKey) -> Result<()> {
        self.watches
            .get_mut(key)
            .ok_or(SceneError::WatchNotFound(key))?
            .reset();
        Ok(())
    }

    /// Deregisters and discards a watch.
    pub fn unwatch(&mut self, key: WatchKey) -> Result<()> {
        let watch = self.watches.remove(key).ok_or(SceneError::WatchNotFound(key))?;
        for node in watch.registrations {
            self.drop_listener(node, Subscriber::Watch(key));
        }
        Ok(())
    }
}
