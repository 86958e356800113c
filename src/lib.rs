//! Skeletal transform graph.
//!
//! A tree of transform nodes with lazily composed matrices, dirty propagation
//! and per-node listeners, plus the bone/skin machinery built on top of it:
//! bones cache an inverted rest pose, and each bone/skin-mesh pairing caches
//! the deformation matrix that moves skin vertices with the bone.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use armature::{SceneGraph, TransformUpdate};
//! use glam::Vec3;
//!
//! let mut graph = SceneGraph::new();
//! let root = graph.create_skeleton_root("rig");
//! let bone = graph.create_bone("upper_arm");
//! let skin = graph.create_skin_mesh("body", None);
//! graph.attach(bone, root)?;
//! graph.attach(skin, root)?;
//!
//! graph.bind_rest_pose_subtree(root)?;
//! let section = graph.add_skin_section(skin, 0, 0)?;
//! let link = graph.add_skin_bone(skin, section, bone)?;
//!
//! graph.set_local_transform(bone, TransformUpdate::new().translation(Vec3::Y))?;
//! let deformation = graph.deformation_matrix(link)?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod errors;
pub mod scene;
pub mod settings;

pub use errors::{Result, SceneError};
pub use scene::{
    Bone, DirtyFlags, ListenerRegistry, Node, NodeHandle, NodeKind, SceneGraph, SceneNode,
    SkinMesh, SkinSection, SkinnedBone, SkinnedBoneKey, Subscriber, Transform, TransformUpdate,
    TransformWatch, UpdateStats, VertexSkinning, WatchKey, WatchMode,
};
pub use settings::GraphSettings;
