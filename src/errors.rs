//! Error Types
//!
//! This module defines the error types used throughout the scene graph.
//!
//! # Overview
//!
//! The main error type [`SceneError`] covers every failure mode of the graph:
//! - Stale or mismatched handles (a node that no longer exists, a node of the wrong kind)
//! - Structural violations (attaching a node beneath its own descendant)
//! - Skinning preconditions (reading a rest pose before it was bound)
//! - Invalid CPU-side skinning data
//!
//! # Usage
//!
//! All fallible APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, SceneError>`.
//!
//! ```rust,ignore
//! use armature::errors::Result;
//!
//! fn pose(graph: &mut SceneGraph, bone: NodeHandle) -> Result<()> {
//!     graph.bind_rest_pose(bone)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::scene::{NodeHandle, SkinnedBoneKey, WatchKey};

/// The main error type for the scene graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    // ========================================================================
    // Handle Errors
    // ========================================================================
    /// The node handle does not refer to a live node.
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeHandle),

    /// The node exists but is not a bone.
    #[error("Node {0:?} is not a bone")]
    NotABone(NodeHandle),

    /// The node exists but is not a skin mesh.
    #[error("Node {0:?} is not a skin mesh")]
    NotASkinMesh(NodeHandle),

    /// The skinned bone handle does not refer to a live skinned bone.
    #[error("Skinned bone not found: {0:?}")]
    SkinnedBoneNotFound(SkinnedBoneKey),

    /// The watch handle does not refer to a live watch.
    #[error("Transform watch not found: {0:?}")]
    WatchNotFound(WatchKey),

    // ========================================================================
    // Hierarchy Errors
    // ========================================================================
    /// Attaching would make a node its own ancestor.
    #[error("Cannot attach {child:?} beneath {parent:?}: would create a cycle")]
    HierarchyCycle {
        /// The node being attached
        child: NodeHandle,
        /// The requested parent
        parent: NodeHandle,
    },

    // ========================================================================
    // Skinning Errors
    // ========================================================================
    /// A skinned bone was registered on a node other than its bone or skin mesh.
    #[error("Skinned bone {key:?} does not depend on {node:?}")]
    UnrelatedSkinnedBone {
        /// The skinned bone
        key: SkinnedBoneKey,
        /// The node it was registered on
        node: NodeHandle,
    },

    /// No node with the bone's name exists beneath the search root.
    #[error("No node named '{name}' beneath {root:?}")]
    NamedBoneNotFound {
        /// The subtree that was searched
        root: NodeHandle,
        /// The bone name looked up
        name: String,
    },

    /// The bone's inverted rest pose was read before `bind_rest_pose`.
    #[error("Rest pose of bone {0:?} has not been bound")]
    RestPoseUnbound(NodeHandle),

    /// Skin section index out of bounds.
    #[error("Skin section {index} out of bounds on {node:?}")]
    SkinSectionOutOfBounds {
        /// The skin mesh node
        node: NodeHandle,
        /// The invalid section index
        index: usize,
    },

    /// No skin section (or no vertex data) covers the vertex.
    #[error("Vertex {vertex} is not covered by the skin of {node:?}")]
    VertexOutOfBounds {
        /// The skin mesh node
        node: NodeHandle,
        /// The invalid vertex index
        vertex: u32,
    },

    /// A vertex refers to a bone index outside its skin section.
    #[error("Bone index {index} out of bounds in skin section with {bone_count} bones")]
    BoneIndexOutOfBounds {
        /// The bone index stored in the vertex data
        index: usize,
        /// Number of bones in the section
        bone_count: usize,
    },

    /// Vertex skinning arrays are inconsistent.
    #[error("Invalid vertex skinning data: {0}")]
    InvalidVertexSkinning(String),
}

/// Alias for `Result<T, SceneError>`.
pub type Result<T> = std::result::Result<T, SceneError>;
