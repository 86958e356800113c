//! Transform hierarchy tests
//!
//! Tests for:
//! - Local matrix composition order (scale, rotate, translate)
//! - Parent-relative composition across several levels
//! - Dirty state machine (initially dirty, clean after read, dirty after mutation)
//! - Ancestor mutation invalidating descendants
//! - Re-parenting and skeleton-relative matrices

use std::f32::consts::FRAC_PI_2;

use armature::{GraphSettings, SceneGraph, TransformUpdate};
use glam::{Affine3A, Quat, Vec3};

// ============================================================================
// Helper
// ============================================================================

const EPSILON: f32 = 1e-5;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn translation_of(m: Affine3A) -> Vec3 {
    Vec3::from(m.translation)
}

// ============================================================================
// Composition
// ============================================================================

#[test]
fn three_level_chain_composes_translations() {
    init_logger();
    let mut graph = SceneGraph::new();
    let root = graph.create_group("root");
    let child = graph.create_group("child");
    let grandchild = graph.create_group("grandchild");
    graph.attach(child, root).unwrap();
    graph.attach(grandchild, child).unwrap();

    graph
        .set_local_transform(root, TransformUpdate::new().translation(Vec3::new(1.0, 0.0, 0.0)))
        .unwrap();
    graph
        .set_local_transform(child, TransformUpdate::new().translation(Vec3::new(0.0, 2.0, 0.0)))
        .unwrap();
    graph
        .set_local_transform(grandchild, TransformUpdate::new().translation(Vec3::new(0.0, 0.0, 3.0)))
        .unwrap();

    let world = graph.composed_matrix(grandchild).unwrap();
    assert!(vec3_approx(translation_of(world), Vec3::new(1.0, 2.0, 3.0)));
}

#[test]
fn root_mutation_reaches_grandchild() {
    let mut graph = SceneGraph::new();
    let root = graph.create_group("root");
    let child = graph.create_group("child");
    let grandchild = graph.create_group("grandchild");
    graph.attach(child, root).unwrap();
    graph.attach(grandchild, child).unwrap();
    graph
        .set_local_transform(child, TransformUpdate::new().translation(Vec3::new(0.0, 2.0, 0.0)))
        .unwrap();
    graph
        .set_local_transform(grandchild, TransformUpdate::new().translation(Vec3::new(0.0, 0.0, 3.0)))
        .unwrap();

    let before = graph.composed_matrix(grandchild).unwrap();
    assert!(vec3_approx(translation_of(before), Vec3::new(0.0, 2.0, 3.0)));

    graph
        .set_local_transform(root, TransformUpdate::new().translation(Vec3::new(1.0, 0.0, 0.0)))
        .unwrap();
    assert!(graph.node(grandchild).unwrap().transform().is_dirty());

    let after = graph.composed_matrix(grandchild).unwrap();
    assert!(vec3_approx(translation_of(after), Vec3::new(1.0, 2.0, 3.0)));
}

#[test]
fn local_matrix_scales_then_rotates_then_translates() {
    let mut graph = SceneGraph::new();
    let node = graph.create_group("node");
    graph
        .set_local_transform(
            node,
            TransformUpdate::new()
                .scale(Vec3::new(2.0, 1.0, 1.0))
                .rotation(Quat::from_rotation_y(FRAC_PI_2))
                .translation(Vec3::new(10.0, 0.0, 0.0)),
        )
        .unwrap();

    let m = graph.composed_matrix(node).unwrap();
    let p = m.transform_point3(Vec3::X);
    assert!(vec3_approx(p, Vec3::new(10.0, 0.0, -2.0)), "got {p:?}");
}

#[test]
fn parent_rotation_carries_child_offset() {
    let mut graph = SceneGraph::new();
    let parent = graph.create_group("parent");
    let child = graph.create_group("child");
    graph.attach(child, parent).unwrap();
    graph
        .set_local_transform(parent, TransformUpdate::new().rotation(Quat::from_rotation_y(FRAC_PI_2)))
        .unwrap();
    graph
        .set_local_transform(child, TransformUpdate::new().translation(Vec3::X))
        .unwrap();

    let world = graph.composed_matrix(child).unwrap();
    assert!(vec3_approx(translation_of(world), Vec3::new(0.0, 0.0, -1.0)));
}

#[test]
fn partial_update_keeps_other_components() {
    let mut graph = SceneGraph::new();
    let node = graph.create_group("node");
    graph
        .set_local_transform(
            node,
            TransformUpdate::new()
                .translation(Vec3::ONE)
                .scale(Vec3::splat(3.0)),
        )
        .unwrap();
    graph
        .set_local_transform(node, TransformUpdate::new().rotation(Quat::from_rotation_z(0.5)))
        .unwrap();

    let t = graph.node(node).unwrap().transform();
    assert_eq!(t.position(), Vec3::ONE);
    assert_eq!(t.scale(), Vec3::splat(3.0));
}

#[test]
fn composed_inverse_undoes_composed() {
    let mut graph = SceneGraph::new();
    let parent = graph.create_group("parent");
    let child = graph.create_group("child");
    graph.attach(child, parent).unwrap();
    graph
        .set_local_transform(
            parent,
            TransformUpdate::new()
                .translation(Vec3::new(1.0, -2.0, 0.5))
                .rotation(Quat::from_rotation_x(0.3)),
        )
        .unwrap();
    graph
        .set_local_transform(child, TransformUpdate::new().scale(Vec3::new(2.0, 2.0, 0.5)))
        .unwrap();

    let m = graph.composed_matrix(child).unwrap();
    let inv = graph.composed_matrix_inverse(child).unwrap();
    assert!((inv * m).abs_diff_eq(Affine3A::IDENTITY, 1e-5));
}

#[test]
fn zero_scale_is_clamped_to_min_scale() {
    let mut graph = SceneGraph::new();
    let node = graph.create_group("flat");
    graph
        .set_local_transform(node, TransformUpdate::new().scale(Vec3::new(0.0, 1.0, 1.0)))
        .unwrap();

    let inv = graph.composed_matrix_inverse(node).unwrap();
    assert!(inv.is_finite());
}

// ============================================================================
// Dirty State Machine
// ============================================================================

#[test]
fn new_node_starts_dirty_and_cleans_on_read() {
    let mut graph = SceneGraph::new();
    let node = graph.create_group("node");
    assert!(graph.node(node).unwrap().transform().is_dirty());

    graph.composed_matrix(node).unwrap();
    assert!(!graph.node(node).unwrap().transform().is_dirty());

    graph
        .set_local_transform(node, TransformUpdate::new().translation(Vec3::Y))
        .unwrap();
    assert!(graph.node(node).unwrap().transform().is_dirty());
}

#[test]
fn reading_child_cleans_ancestors() {
    let mut graph = SceneGraph::new();
    let parent = graph.create_group("parent");
    let child = graph.create_group("child");
    graph.attach(child, parent).unwrap();

    graph.composed_matrix(child).unwrap();
    assert!(!graph.node(parent).unwrap().transform().is_dirty());
    assert!(!graph.node(child).unwrap().transform().is_dirty());
}

#[test]
fn sibling_mutation_leaves_sibling_clean() {
    let mut graph = SceneGraph::new();
    let parent = graph.create_group("parent");
    let a = graph.create_group("a");
    let b = graph.create_group("b");
    graph.attach(a, parent).unwrap();
    graph.attach(b, parent).unwrap();
    graph.composed_matrix(a).unwrap();
    graph.composed_matrix(b).unwrap();

    graph
        .set_local_transform(a, TransformUpdate::new().translation(Vec3::X))
        .unwrap();
    assert!(graph.node(a).unwrap().transform().is_dirty());
    assert!(!graph.node(b).unwrap().transform().is_dirty());
    assert!(!graph.node(parent).unwrap().transform().is_dirty());
}

#[test]
fn unchanged_reads_return_cached_matrix() {
    let mut graph = SceneGraph::new();
    let node = graph.create_group("node");
    graph
        .set_local_transform(node, TransformUpdate::new().rotation(Quat::from_rotation_y(0.7)))
        .unwrap();
    let first = graph.composed_matrix(node).unwrap();
    let second = graph.composed_matrix(node).unwrap();
    assert_eq!(first, second);
}

// ============================================================================
// Re-parenting
// ============================================================================

#[test]
fn reparent_invalidates_and_recomposes() {
    let mut graph = SceneGraph::new();
    let a = graph.create_group("a");
    let b = graph.create_group("b");
    let child = graph.create_group("child");
    graph
        .set_local_transform(a, TransformUpdate::new().translation(Vec3::X))
        .unwrap();
    graph
        .set_local_transform(b, TransformUpdate::new().translation(Vec3::new(0.0, 0.0, 5.0)))
        .unwrap();
    graph
        .set_local_transform(child, TransformUpdate::new().translation(Vec3::Y))
        .unwrap();

    graph.attach(child, a).unwrap();
    let under_a = graph.composed_matrix(child).unwrap();
    assert!(vec3_approx(translation_of(under_a), Vec3::new(1.0, 1.0, 0.0)));

    graph.attach(child, b).unwrap();
    assert!(graph.node(child).unwrap().transform().is_dirty());
    let under_b = graph.composed_matrix(child).unwrap();
    assert!(vec3_approx(translation_of(under_b), Vec3::new(0.0, 1.0, 5.0)));
    assert!(graph.node(a).unwrap().children().is_empty());
}

#[test]
fn detach_returns_to_world_space() {
    let mut graph = SceneGraph::new();
    let parent = graph.create_group("parent");
    let child = graph.create_group("child");
    graph.attach(child, parent).unwrap();
    graph
        .set_local_transform(parent, TransformUpdate::new().translation(Vec3::splat(4.0)))
        .unwrap();

    graph.detach(child).unwrap();
    let world = graph.composed_matrix(child).unwrap();
    assert!(vec3_approx(translation_of(world), Vec3::ZERO));
    assert!(graph.roots().contains(&child));
}

// ============================================================================
// Skeleton-relative Matrices
// ============================================================================

#[test]
fn skeletal_matrix_stops_at_skeleton_root() {
    let mut graph = SceneGraph::new();
    let world = graph.create_group("world");
    let rig = graph.create_skeleton_root("rig");
    let hip = graph.create_bone("hip");
    let knee = graph.create_bone("knee");
    graph.attach(rig, world).unwrap();
    graph.attach(hip, rig).unwrap();
    graph.attach(knee, hip).unwrap();

    graph
        .set_local_transform(world, TransformUpdate::new().translation(Vec3::new(100.0, 0.0, 0.0)))
        .unwrap();
    graph
        .set_local_transform(rig, TransformUpdate::new().translation(Vec3::new(0.0, 50.0, 0.0)))
        .unwrap();
    graph
        .set_local_transform(hip, TransformUpdate::new().translation(Vec3::new(0.0, 1.0, 0.0)))
        .unwrap();
    graph
        .set_local_transform(knee, TransformUpdate::new().translation(Vec3::new(0.0, -0.5, 0.0)))
        .unwrap();

    let skeletal = graph.skeletal_matrix(knee).unwrap();
    assert!(vec3_approx(translation_of(skeletal), Vec3::new(0.0, 0.5, 0.0)));

    let composed = graph.composed_matrix(knee).unwrap();
    assert!(vec3_approx(translation_of(composed), Vec3::new(100.0, 50.5, 0.0)));

    assert_eq!(graph.skeletal_matrix(rig).unwrap(), Affine3A::IDENTITY);
}

#[test]
fn skeletal_matrix_without_root_uses_world_origin() {
    let mut graph = SceneGraph::new();
    let parent = graph.create_group("parent");
    let bone = graph.create_bone("loose");
    graph.attach(bone, parent).unwrap();
    graph
        .set_local_transform(parent, TransformUpdate::new().translation(Vec3::Z))
        .unwrap();

    let skeletal = graph.skeletal_matrix(bone).unwrap();
    let composed = graph.composed_matrix(bone).unwrap();
    assert!(skeletal.abs_diff_eq(composed, EPSILON));
}

#[test]
fn skeletal_inverse_is_cached_per_mutation() {
    let mut graph = SceneGraph::with_settings(GraphSettings::default());
    let rig = graph.create_skeleton_root("rig");
    let bone = graph.create_bone("bone");
    graph.attach(bone, rig).unwrap();
    graph
        .set_local_transform(bone, TransformUpdate::new().translation(Vec3::new(0.0, 2.0, 0.0)))
        .unwrap();

    let inv = graph.skeletal_matrix_inverse(bone).unwrap();
    assert!(vec3_approx(translation_of(inv), Vec3::new(0.0, -2.0, 0.0)));

    graph
        .set_local_transform(bone, TransformUpdate::new().translation(Vec3::new(0.0, 3.0, 0.0)))
        .unwrap();
    let inv = graph.skeletal_matrix_inverse(bone).unwrap();
    assert!(vec3_approx(translation_of(inv), Vec3::new(0.0, -3.0, 0.0)));
}
