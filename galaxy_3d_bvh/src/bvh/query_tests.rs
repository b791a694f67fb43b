//! Unit tests for ray / frustum queries and tree diagnostics

use std::sync::Arc;
use glam::Vec3;
use crate::bvh::settings::BvhSettings;
use crate::bvh::test_support::{dyn_obj, row_of_cubes, TestObject};
use super::*;

/// Six cubes along X, split into two leaves at x = 120.
fn split_tree() -> Tree {
    let mut tree = Tree::new(BvhSettings::default());
    for cube in row_of_cubes(1, 6) {
        tree.add(dyn_obj(&cube));
    }
    assert_eq!(tree.leaves().len(), 2);
    tree
}

fn region(min: Vec3, max: Vec3) -> Frustum {
    Frustum::from_aabb(&AABB::new(min, max))
}

fn ids(objects: &[Arc<dyn BvhObject>]) -> Vec<ObjectId> {
    let mut ids: Vec<ObjectId> = objects.iter().map(|object| object.id()).collect();
    ids.sort();
    ids
}

fn picked_ids(picks: &[PickData]) -> Vec<ObjectId> {
    let mut ids: Vec<ObjectId> = picks.iter().map(|pick| pick.object.id()).collect();
    ids.sort();
    ids
}

// ============================================================================
// pick_ray
// ============================================================================

#[test]
fn test_ray_missing_root_hits_nothing() {
    let mut tree = split_tree();
    let ray = Ray::new(Vec3::new(0.0, 100.0, 0.0), Vec3::Y);

    assert!(tree.pick_ray(&ray, &[]).is_none());
    assert_eq!(tree.last_stats, QueryStats { nodes_visited: 1, node_tests: 1, object_tests: 0 });
}

#[test]
fn test_ray_on_empty_tree() {
    let mut tree = Tree::new(BvhSettings::default());
    let ray = Ray::new(Vec3::ZERO, Vec3::X);

    assert!(tree.pick_ray(&ray, &[]).is_none());
}

#[test]
fn test_ray_picks_nearest_object() {
    let mut tree = split_tree();
    let ray = Ray::new(Vec3::new(-100.0, 0.0, 0.0), Vec3::X);

    let pick = tree.pick_ray(&ray, &[]).expect("ray should hit the first cube");

    assert_eq!(pick.object.id(), ObjectId(1));
    assert_eq!(pick.pick_pos, Vec3::new(-5.0, 0.0, 0.0));
    // The high leaf starts beyond the first hit and is never opened
    assert_eq!(tree.last_stats.object_tests, 3);
}

#[test]
fn test_ray_skips_ignored_objects() {
    let mut tree = split_tree();
    let ray = Ray::new(Vec3::new(-100.0, 0.0, 0.0), Vec3::X);

    let pick = tree.pick_ray(&ray, &[ObjectId(1)]).expect("ray should hit the second cube");

    assert_eq!(pick.object.id(), ObjectId(2));
    assert_eq!(pick.pick_pos, Vec3::new(35.0, 0.0, 0.0));
}

#[test]
fn test_ray_ignores_hits_behind_origin() {
    let mut tree = split_tree();
    // Starts inside the first cube: its entry distance is negative
    let ray = Ray::new(Vec3::ZERO, Vec3::X);

    let pick = tree.pick_ray(&ray, &[]).expect("ray should hit the second cube");

    assert_eq!(pick.object.id(), ObjectId(2));
}

#[test]
fn test_lights_are_not_pickable() {
    let mut tree = split_tree();
    tree.add(dyn_obj(&TestObject::point_light(50, Vec3::new(60.0, 0.0, 0.0), 10.0)));
    let ray = Ray::new(Vec3::new(60.0, -100.0, 0.0), Vec3::Y);

    assert!(tree.pick_ray(&ray, &[]).is_none());
}

// ============================================================================
// pick_frustum
// ============================================================================

#[test]
fn test_enclosing_frustum_picks_all_without_object_tests() {
    let mut tree = split_tree();
    let frustum = region(Vec3::splat(-1000.0), Vec3::splat(1000.0));

    let picks = tree.pick_frustum(&frustum, &[], false);

    assert_eq!(picks.len(), 6);
    assert_eq!(tree.last_stats, QueryStats { nodes_visited: 3, node_tests: 1, object_tests: 0 });
}

#[test]
fn test_pick_frustum_partial_flag() {
    let mut tree = split_tree();
    // Holds the first cube, cuts through the second
    let frustum = region(Vec3::splat(-10.0), Vec3::new(40.0, 10.0, 10.0));

    let inside_only = tree.pick_frustum(&frustum, &[], false);
    assert_eq!(picked_ids(&inside_only), vec![ObjectId(1)]);

    let with_partial = tree.pick_frustum(&frustum, &[], true);
    assert_eq!(picked_ids(&with_partial), vec![ObjectId(1), ObjectId(2)]);
}

#[test]
fn test_pick_frustum_prunes_outside_leaf() {
    let mut tree = split_tree();
    let frustum = region(Vec3::splat(-10.0), Vec3::new(50.0, 10.0, 10.0));

    let picks = tree.pick_frustum(&frustum, &[], false);

    assert_eq!(picked_ids(&picks), vec![ObjectId(1), ObjectId(2)]);
    // root + both children classified, only the low leaf's objects tested
    assert_eq!(tree.last_stats, QueryStats { nodes_visited: 3, node_tests: 3, object_tests: 3 });
}

#[test]
fn test_pick_frustum_pick_pos_is_box_center() {
    let mut tree = split_tree();
    let frustum = region(Vec3::splat(-10.0), Vec3::splat(10.0));

    let picks = tree.pick_frustum(&frustum, &[], false);

    assert_eq!(picks.len(), 1);
    assert_eq!(picks[0].pick_pos, Vec3::ZERO);
}

#[test]
fn test_pick_frustum_skips_ignored() {
    let mut tree = split_tree();
    let frustum = region(Vec3::splat(-1000.0), Vec3::splat(1000.0));

    let picks = tree.pick_frustum(&frustum, &[ObjectId(2), ObjectId(5)], false);

    assert_eq!(picked_ids(&picks), vec![ObjectId(1), ObjectId(3), ObjectId(4), ObjectId(6)]);
}

#[test]
fn test_frustum_queries_reset_inside_flags() {
    let mut tree = split_tree();
    let frustum = region(Vec3::splat(-1000.0), Vec3::splat(1000.0));

    tree.pick_frustum(&frustum, &[], false);
    assert!(tree.nodes.values().all(|node| !node.inside_frustum));

    tree.frustum_test(&frustum);
    assert!(tree.nodes.values().all(|node| !node.inside_frustum));
}

// ============================================================================
// frustum_test / frustum_test_lights
// ============================================================================

#[test]
fn test_frustum_test_includes_partial_objects() {
    let mut tree = split_tree();
    let frustum = region(Vec3::splat(-10.0), Vec3::new(40.0, 10.0, 10.0));

    let visible = tree.frustum_test(&frustum);

    assert_eq!(ids(&visible), vec![ObjectId(1), ObjectId(2)]);
}

#[test]
fn test_frustum_test_excludes_lights() {
    let mut tree = split_tree();
    tree.add(dyn_obj(&TestObject::point_light(50, Vec3::new(120.0, 0.0, 0.0), 10.0)));
    let frustum = region(Vec3::splat(-1000.0), Vec3::splat(1000.0));

    let visible = tree.frustum_test(&frustum);

    assert_eq!(visible.len(), 6);
    assert!(visible.iter().all(|object| object.id() != ObjectId(50)));
}

#[test]
fn test_frustum_test_lights_deduplicates() {
    let mut tree = split_tree();
    tree.add(dyn_obj(&TestObject::point_light(50, Vec3::new(120.0, 0.0, 0.0), 10.0)));
    tree.add(dyn_obj(&TestObject::point_light(51, Vec3::new(180.0, 0.0, 0.0), 5.0)));

    let everywhere = tree.frustum_test_lights(&region(Vec3::splat(-1000.0), Vec3::splat(1000.0)));
    assert_eq!(ids(&everywhere), vec![ObjectId(50), ObjectId(51)]);

    let low_side = tree.frustum_test_lights(&region(Vec3::splat(-10.0), Vec3::new(50.0, 10.0, 10.0)));
    assert_eq!(ids(&low_side), vec![ObjectId(50)]);

    let nowhere = tree.frustum_test_lights(&region(Vec3::splat(500.0), Vec3::splat(600.0)));
    assert!(nowhere.is_empty());
}

// ============================================================================
// Diagnostics
// ============================================================================

#[test]
fn test_debug_boxes_one_per_leaf() {
    let mut tree = split_tree();
    tree.add(dyn_obj(&TestObject::point_light(50, Vec3::new(100.0, 0.0, 0.0), 3.0)));

    let boxes = tree.debug_boxes();

    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[0].object_count, 3);
    assert_eq!(boxes[0].light_count, 1);
    assert!(boxes[0].color.abs_diff_eq(Vec3::new(1.0, 0.4, 0.1), 1e-6));
    assert_eq!(boxes[1].light_count, 0);
    assert!(boxes[1].color.abs_diff_eq(Vec3::new(0.1, 0.4, 1.0), 1e-6));
}

#[test]
fn test_debug_boxes_without_lights_are_cold() {
    let tree = split_tree();

    for debug_box in tree.debug_boxes() {
        assert_eq!(debug_box.color, Vec3::new(0.1, 0.4, 1.0));
    }
}

#[test]
fn test_distribution_quality_empty_tree() {
    let tree = Tree::new(BvhSettings::default());
    let quality = tree.distribution_quality();

    assert_eq!(quality.total_objects, 0);
    assert_eq!(quality.assigned_objects, 0);
    assert_eq!(quality.ratio, 1.0);
}

#[test]
fn test_distribution_quality_counts_shared_lights() {
    let mut tree = split_tree();
    assert_eq!(tree.distribution_quality().ratio, 1.0);

    tree.add(dyn_obj(&TestObject::point_light(50, Vec3::new(120.0, 0.0, 0.0), 10.0)));
    let quality = tree.distribution_quality();

    assert_eq!(quality.total_objects, 7);
    assert_eq!(quality.assigned_objects, 8);
    assert!((quality.ratio - 8.0 / 7.0).abs() < 1e-6);
}
