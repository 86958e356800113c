//! Scene graph module.
//!
//! Manages the transform hierarchy and the objects that depend on it:
//! - Node: scene node (parent/child links, transform, kind, listeners)
//! - Transform: local TRS plus lazily rebuilt matrices
//! - SceneGraph: arena owning nodes, skinned bones and watches
//! - Bone / SkinMesh / SkinnedBone: skeletal deformation
//! - ListenerRegistry: per-node transform observers
//! - TransformSystem: queued mutations and batched world refresh

pub mod bone;
pub mod graph;
pub mod listeners;
pub mod node;
pub mod skin;
pub mod transform;
pub mod transform_system;
pub mod watch;
pub mod wrapper;

pub use bone::{Bone, is_rigid};
pub use graph::SceneGraph;
pub use listeners::{ListenerRegistry, Subscriber, SubscriberList};
pub use node::{Node, NodeKind};
pub use skin::{SkinMesh, SkinSection, SkinnedBone, VertexSkinning, deformation_matrix};
pub use transform::{DirtyFlags, Transform, TransformUpdate};
pub use transform_system::UpdateStats;
pub use watch::{TransformWatch, WatchMode};
pub use wrapper::SceneNode;

use slotmap::new_key_type;

new_key_type! {
    pub struct NodeHandle;
    pub struct SkinnedBoneKey;
    pub struct WatchKey;
}
