use glam::Affine3A;

use crate::scene::NodeHandle;
use crate::scene::bone::Bone;
use crate::scene::listeners::ListenerRegistry;
use crate::scene::skin::SkinMesh;
use crate::scene::transform::Transform;

/// What a node is, beyond being a transform in the tree.
///
/// Specialised behaviour is carried as data on the variant rather than
/// through a type hierarchy; the graph matches on the kind where it matters.
#[derive(Debug, Clone, Default)]
pub enum NodeKind {
    /// Plain transform node.
    #[default]
    Group,
    /// Establishes the coordinate space shared by every bone and skin mesh
    /// beneath it.
    SkeletonRoot,
    /// A bone with its cached inverted rest pose.
    Bone(Bone),
    /// A skin mesh owning its skin sections.
    SkinMesh(SkinMesh),
}

impl NodeKind {
    #[inline]
    #[must_use]
    pub fn is_skeleton_root(&self) -> bool {
        matches!(self, Self::SkeletonRoot)
    }

    #[inline]
    #[must_use]
    pub fn as_bone(&self) -> Option<&Bone> {
        match self {
            Self::Bone(bone) => Some(bone),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_skin_mesh(&self) -> Option<&SkinMesh> {
        match self {
            Self::SkinMesh(skin) => Some(skin),
            _ => None,
        }
    }
}

/// A scene node.
///
/// # Hierarchy
///
/// - `parent`: non-owning handle to the parent (None for root nodes)
/// - `children`: handles of the nodes this node owns; removing a node removes
///   its whole subtree
///
/// # Transform
///
/// The [`Transform`] holds the local TRS and the lazily rebuilt matrices.
/// Mutation goes through [`SceneGraph`](crate::scene::SceneGraph), which marks
/// the subtree dirty and notifies the [`ListenerRegistry`].
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) name: String,

    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,

    pub(crate) transform: Transform,
    pub(crate) kind: NodeKind,
    pub(crate) listeners: ListenerRegistry,
}

impl Node {
    #[must_use]
    pub fn new(name: &str, kind: NodeKind) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
            transform: Transform::new(),
            kind,
            listeners: ListenerRegistry::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parent node handle, if any.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    /// Returns a read-only slice of child node handles.
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[inline]
    #[must_use]
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Last composed matrix, without recomputing. Only meaningful when
    /// [`Transform::is_dirty`] is `false`; use
    /// [`SceneGraph::composed_matrix`](crate::scene::SceneGraph::composed_matrix)
    /// otherwise.
    #[inline]
    #[must_use]
    pub fn cached_world_matrix(&self) -> &Affine3A {
        &self.transform.world_matrix
    }
}
