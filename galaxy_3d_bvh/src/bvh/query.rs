/// Query engine - ray pick, frustum pick, frustum visibility test and
/// diagnostic traversals.
///
/// All traversals are breadth-first over a reused queue. Frustum traversals
/// propagate "fully inside" classification down the tree through the
/// per-node `inside_frustum` scratch flag; every flag a traversal sets is
/// cleared again before it returns.

use std::collections::VecDeque;
use std::sync::Arc;
use glam::Vec3;
use rustc_hash::FxHashSet;
use slotmap::SlotMap;
use crate::geometry::{Frustum, FrustumTest, Ray, AABB};
use super::node::{BvhNode, NodeKey};
use super::object::{BvhObject, ObjectId, ObjectVolume};
use super::tree::Tree;

/// Traversal counters of the last query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Nodes popped from the traversal queue
    pub nodes_visited: u32,
    /// Geometric tests against node AABBs
    pub node_tests: u32,
    /// Geometric tests against individual objects
    pub object_tests: u32,
}

/// A picked object and the world-space point it was picked at.
#[derive(Clone)]
pub struct PickData {
    /// Picked object
    pub object: Arc<dyn BvhObject>,
    /// Ray hit point, or the object AABB center for frustum picks
    pub pick_pos: Vec3,
}

impl std::fmt::Debug for PickData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PickData")
            .field("object", &self.object.id())
            .field("pick_pos", &self.pick_pos)
            .finish()
    }
}

/// One leaf box for visualization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugBox {
    /// Leaf bounds
    pub aabb: AABB,
    /// RGB, from cool (no lights) to hot (most lit leaf)
    pub color: Vec3,
    /// Bounded objects in the leaf
    pub object_count: usize,
    /// Lights reaching the leaf
    pub light_count: usize,
}

/// How well registered objects are spread over the leaves.
///
/// `ratio` is leaf entries per registered object: 1.0 when every bounded
/// object sits in its leaf and no light spans several leaves, above 1.0
/// when lights are shared, below 1.0 when lights fell out of every leaf.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistributionQuality {
    /// Registered objects, lights included
    pub total_objects: usize,
    /// Object and light entries summed over every live leaf
    pub assigned_objects: usize,
    /// `assigned_objects / total_objects` (1.0 for an empty tree)
    pub ratio: f32,
}

const DEBUG_COLOR_COLD: Vec3 = Vec3::new(0.1, 0.4, 1.0);
const DEBUG_COLOR_HOT: Vec3 = Vec3::new(1.0, 0.4, 0.1);

impl Tree {
    /// Nearest positive-distance hit among bounded objects.
    ///
    /// Lights are not pickable. Objects in `ignore` are skipped.
    pub fn pick_ray(&mut self, ray: &Ray, ignore: &[ObjectId]) -> Option<PickData> {
        let mut stats = QueryStats::default();
        let mut closest = f32::MAX;
        let mut picked: Option<PickData> = None;

        let mut queue = std::mem::take(&mut self.traversal);
        queue.clear();
        queue.push_back(self.root);

        while let Some(key) = queue.pop_front() {
            let node = &self.nodes[key];
            stats.nodes_visited += 1;
            stats.node_tests += 1;

            match ray.intersect_aabb(&node.aabb) {
                // Nothing in this box can beat the current hit
                Some(entry) if entry <= closest => {}
                _ => continue,
            }

            if let Some([low, high]) = node.children {
                queue.push_back(low);
                queue.push_back(high);
                continue;
            }

            for id in &node.objects {
                if ignore.contains(id) {
                    continue;
                }
                let Some(entry) = self.entries.get(id) else {
                    continue;
                };

                stats.object_tests += 1;
                if let Some(dist) = entry.object.ray_intersection(ray) {
                    if dist > 0.0 && dist < closest {
                        closest = dist;
                        picked = Some(PickData {
                            object: entry.object.clone(),
                            pick_pos: ray.at(dist),
                        });
                    }
                }
            }
        }

        self.traversal = queue;
        self.last_stats = stats;
        picked
    }

    /// Bounded objects inside a selection frustum.
    ///
    /// Objects fully inside are always picked; objects crossing the frustum
    /// boundary only when `pick_partially_inside` is set.
    pub fn pick_frustum(
        &mut self,
        frustum: &Frustum,
        ignore: &[ObjectId],
        pick_partially_inside: bool,
    ) -> Vec<PickData> {
        let mut picked = Vec::new();
        let Tree { nodes, root, entries, traversal, last_stats, .. } = self;

        *last_stats = traverse_frustum(nodes, *root, traversal, frustum, |node, class, stats| {
            for id in &node.objects {
                if ignore.contains(id) {
                    continue;
                }
                let Some(entry) = entries.get(id) else {
                    continue;
                };
                let ObjectVolume::Bounded(aabb) = entry.volume else {
                    continue;
                };

                let keep = match class {
                    FrustumTest::Inside => true,
                    _ => {
                        stats.object_tests += 1;
                        match frustum.classify_aabb(&aabb) {
                            FrustumTest::Inside => true,
                            FrustumTest::Partial => pick_partially_inside,
                            FrustumTest::Outside => false,
                        }
                    }
                };

                if keep {
                    picked.push(PickData {
                        object: entry.object.clone(),
                        pick_pos: aabb.center(),
                    });
                }
            }
        });

        picked
    }

    /// Visible bounded objects for render-list culling.
    ///
    /// Objects crossing the frustum boundary count as visible.
    pub fn frustum_test(&mut self, frustum: &Frustum) -> Vec<Arc<dyn BvhObject>> {
        let mut visible = Vec::new();
        let Tree { nodes, root, entries, traversal, last_stats, .. } = self;

        *last_stats = traverse_frustum(nodes, *root, traversal, frustum, |node, class, stats| {
            for id in &node.objects {
                let Some(entry) = entries.get(id) else {
                    continue;
                };
                let inside = match (class, entry.volume) {
                    (FrustumTest::Inside, _) => true,
                    (_, ObjectVolume::Bounded(aabb)) => {
                        stats.object_tests += 1;
                        frustum.intersects_aabb(&aabb)
                    }
                    _ => false,
                };
                if inside {
                    visible.push(entry.object.clone());
                }
            }
        });

        visible
    }

    /// Lights attached to any leaf the frustum reaches, without duplicates.
    pub fn frustum_test_lights(&mut self, frustum: &Frustum) -> Vec<Arc<dyn BvhObject>> {
        let mut lights = Vec::new();
        let mut seen = FxHashSet::default();
        let Tree { nodes, root, entries, traversal, last_stats, .. } = self;

        *last_stats = traverse_frustum(nodes, *root, traversal, frustum, |node, _, _| {
            for id in &node.lights {
                if !seen.insert(*id) {
                    continue;
                }
                if let Some(entry) = entries.get(id) {
                    lights.push(entry.object.clone());
                }
            }
        });

        lights
    }

    /// Leaf entries per registered object.
    pub fn distribution_quality(&self) -> DistributionQuality {
        let total_objects = self.object_count();
        let assigned_objects = self.assigned_count();
        let ratio = if total_objects == 0 {
            1.0
        } else {
            assigned_objects as f32 / total_objects as f32
        };
        DistributionQuality { total_objects, assigned_objects, ratio }
    }

    /// One box per live leaf, colored by how many lights reach it.
    pub fn debug_boxes(&self) -> Vec<DebugBox> {
        let leaves = self.leaves();
        let max_lights = leaves
            .iter()
            .map(|&key| self.nodes[key].lights.len())
            .max()
            .unwrap_or(0);

        leaves
            .into_iter()
            .map(|key| {
                let node = &self.nodes[key];
                let density = if max_lights == 0 {
                    0.0
                } else {
                    node.lights.len() as f32 / max_lights as f32
                };
                DebugBox {
                    aabb: node.aabb,
                    color: DEBUG_COLOR_COLD.lerp(DEBUG_COLOR_HOT, density),
                    object_count: node.objects.len(),
                    light_count: node.lights.len(),
                }
            })
            .collect()
    }
}

/// Breadth-first frustum traversal with containment propagation.
///
/// `on_leaf` runs once per reached leaf with `Inside` (the leaf or one of
/// its ancestors is fully inside, no per-object test needed) or `Partial`.
fn traverse_frustum<F>(
    nodes: &mut SlotMap<NodeKey, BvhNode>,
    root: NodeKey,
    queue: &mut VecDeque<NodeKey>,
    frustum: &Frustum,
    mut on_leaf: F,
) -> QueryStats
where
    F: FnMut(&BvhNode, FrustumTest, &mut QueryStats),
{
    let mut stats = QueryStats::default();
    queue.clear();
    queue.push_back(root);

    while let Some(key) = queue.pop_front() {
        stats.nodes_visited += 1;

        let class = if nodes[key].inside_frustum {
            nodes[key].inside_frustum = false;
            FrustumTest::Inside
        } else {
            stats.node_tests += 1;
            frustum.classify_aabb(&nodes[key].aabb)
        };

        match (class, nodes[key].children) {
            (FrustumTest::Outside, _) => {}
            (FrustumTest::Inside, Some(children)) => {
                for child in children {
                    nodes[child].inside_frustum = true;
                    queue.push_back(child);
                }
            }
            (FrustumTest::Partial, Some([low, high])) => {
                queue.push_back(low);
                queue.push_back(high);
            }
            (_, None) => on_leaf(&nodes[key], class, &mut stats),
        }
    }

    debug_assert!(nodes.values().all(|node| !node.inside_frustum));
    stats
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
