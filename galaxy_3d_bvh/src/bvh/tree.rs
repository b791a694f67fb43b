/// Tree engine - insertion routing, split/merge rebalancing, removal,
/// full rebuild and deferred node deletion.
///
/// Nodes live in a `SlotMap` arena. A node owns its children through their
/// keys and points back to its parent with a plain key, so retiring a node
/// never leaves a dangling reference: stale keys just fail to resolve.
///
/// Objects are referenced by `ObjectId`. Each registered object carries the
/// list of leaves it currently occupies:
/// - bounded objects: exactly one leaf
/// - lights: every leaf their influence volume reaches (zero or more)

use std::collections::VecDeque;
use std::sync::Arc;
use glam::Vec3;
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;
use crate::error::{Error, Result};
use crate::geometry::AABB;
use crate::{bvh_debug, bvh_trace};
use super::node::{BvhNode, NodeKey, NodeState};
use super::object::{BvhObject, ObjectId, ObjectVolume};
use super::query::QueryStats;
use super::settings::BvhSettings;

const LOG_SOURCE: &str = "galaxy3d::bvh::Tree";

/// Result of inserting one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Inserted without touching the root bounds
    Inserted,
    /// Inserted, and the root AABB had to grow to cover the object.
    /// The existing partitioning no longer matches the scene extent.
    InsertedAndGrewRoot,
    /// Object reported `ObjectVolume::NotIndexed`
    Ignored,
}

/// Per-object bookkeeping.
pub(crate) struct TreeEntry {
    /// Handle to the host object
    pub(crate) object: Arc<dyn BvhObject>,
    /// Volume sampled at insertion; routing, splits and light re-tests all
    /// use this copy so the tree stays consistent with itself.
    pub(crate) volume: ObjectVolume,
    /// Leaves holding this object
    pub(crate) leaves: Vec<NodeKey>,
}

/// Dynamic bounding volume hierarchy over bounded objects and lights.
///
/// Single-threaded: mutations come from the owning `Bvh`, which drains the
/// change queues first. Queries take `&mut self` for the reused traversal
/// queue and the per-node frustum scratch flag.
pub struct Tree {
    /// Node arena, retired nodes included until `collect_garbage()`
    pub(crate) nodes: SlotMap<NodeKey, BvhNode>,
    /// Root node, a leaf until the first split
    pub(crate) root: NodeKey,
    /// Registered objects and the leaves holding them
    pub(crate) entries: FxHashMap<ObjectId, TreeEntry>,
    /// Merged-away nodes waiting for `collect_garbage()`
    nodes_to_delete: Vec<NodeKey>,
    settings: BvhSettings,
    /// Reused BFS queue for queries
    pub(crate) traversal: VecDeque<NodeKey>,
    /// Counters of the last ray or frustum query
    pub(crate) last_stats: QueryStats,
}

impl Tree {
    /// Empty tree: a single leaf root with empty bounds.
    ///
    /// The first insertion always grows the root.
    pub fn new(settings: BvhSettings) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(BvhNode::new(AABB::EMPTY, None, 0));

        Self {
            nodes,
            root,
            entries: FxHashMap::default(),
            nodes_to_delete: Vec::new(),
            settings,
            traversal: VecDeque::new(),
            last_stats: QueryStats::default(),
        }
    }

    // ===== ACCESSORS =====

    /// Settings the tree was created or last rebuilt with.
    pub fn settings(&self) -> &BvhSettings {
        &self.settings
    }

    /// Key of the root node. Changes on every rebuild.
    pub fn root(&self) -> NodeKey {
        self.root
    }

    /// Global extent. Grows with insertions, reset only by a rebuild.
    pub fn root_bounds(&self) -> AABB {
        self.nodes[self.root].aabb
    }

    /// Look up a node. `None` once it has been freed.
    pub fn node(&self, key: NodeKey) -> Option<&BvhNode> {
        self.nodes.get(key)
    }

    /// Nodes in the arena, pending deletions included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes merged away and not yet freed.
    pub fn pending_deletion_count(&self) -> usize {
        self.nodes_to_delete.len()
    }

    /// Live leaves reachable from the root.
    pub fn leaves(&self) -> Vec<NodeKey> {
        let mut leaves = Vec::new();
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            match self.nodes[key].children {
                Some([low, high]) => {
                    stack.push(high);
                    stack.push(low);
                }
                None => leaves.push(key),
            }
        }
        leaves
    }

    /// Registered (inserted) objects.
    pub fn object_count(&self) -> usize {
        self.entries.len()
    }

    /// Is `id` registered (lights included, even when in no leaf)?
    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Leaves currently holding `id` (empty when unknown).
    pub fn leaves_of(&self, id: ObjectId) -> &[NodeKey] {
        self.entries
            .get(&id)
            .map(|entry| entry.leaves.as_slice())
            .unwrap_or(&[])
    }

    /// Every registered object, ordered by id.
    pub fn objects(&self) -> Vec<Arc<dyn BvhObject>> {
        let mut objects: Vec<_> = self.entries.values().map(|entry| entry.object.clone()).collect();
        objects.sort_by_key(|object| object.id());
        objects
    }

    /// Sum of bounded and light entries over every live leaf.
    pub fn assigned_count(&self) -> usize {
        self.leaves()
            .into_iter()
            .map(|key| {
                let node = &self.nodes[key];
                node.objects.len() + node.lights.len()
            })
            .sum()
    }

    // ===== INSERTION =====

    /// Insert an object, sampling its current volume.
    ///
    /// An object that is already registered is re-inserted.
    pub fn add(&mut self, object: Arc<dyn BvhObject>) -> InsertOutcome {
        let volume = object.volume();
        self.insert(object, volume)
    }

    fn insert(&mut self, object: Arc<dyn BvhObject>, volume: ObjectVolume) -> InsertOutcome {
        let Some(growth) = volume.growth_bounds() else {
            return InsertOutcome::Ignored;
        };

        let id = object.id();
        if self.entries.contains_key(&id) {
            bvh_debug!(LOG_SOURCE, "Object {} inserted twice, re-inserting", id);
            self.remove(id);
        }

        let is_light = volume.is_light();
        let anchor = volume.anchor();
        let root_grew = self.nodes[self.root].aabb.grow(&growth);

        self.entries.insert(id, TreeEntry { object, volume, leaves: Vec::new() });

        // Breadth-first routing down to the leaves
        let mut next_nodes = VecDeque::from([self.root]);
        let mut reached = Vec::new();
        let mut grown = FxHashSet::default();
        if root_grew {
            grown.insert(self.root);
        }

        while let Some(key) = next_nodes.pop_front() {
            let node = &self.nodes[key];
            if !node.is_live() {
                continue;
            }

            let Some([low, high]) = node.children else {
                reached.push(key);
                continue;
            };

            let hit_low = volume.intersects_aabb(&self.nodes[low].aabb);
            let hit_high = volume.intersects_aabb(&self.nodes[high].aabb);

            match (hit_low, hit_high) {
                (true, true) if is_light => {
                    next_nodes.push_back(low);
                    next_nodes.push_back(high);
                }
                (true, true) => {
                    let child = self.nearer_child(anchor, low, high);
                    if self.nodes[child].aabb.grow(&growth) {
                        grown.insert(child);
                    }
                    next_nodes.push_back(child);
                }
                (true, false) | (false, true) => {
                    let child = if hit_low { low } else { high };
                    if !is_light && self.nodes[child].aabb.grow(&growth) {
                        grown.insert(child);
                    }
                    next_nodes.push_back(child);
                }
                (false, false) => {
                    // Only possible after this node grew to take the object
                    let child = self.nearer_child(anchor, low, high);
                    if self.nodes[child].aabb.grow(&growth) {
                        grown.insert(child);
                    }
                    next_nodes.push_back(child);
                }
            }
        }

        for &leaf in &reached {
            let node = &mut self.nodes[leaf];
            if is_light {
                node.lights.push(id);
            } else {
                node.objects.push(id);
            }
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.leaves.push(leaf);
            }
        }

        debug_assert!(
            is_light || reached.len() == 1,
            "bounded object {} routed to {} leaves",
            id,
            reached.len()
        );

        // A grown leaf may now reach lights inserted before it grew
        for &leaf in reached.iter().filter(|leaf| grown.contains(*leaf)) {
            self.attach_reaching_lights(leaf);
        }
        // Routing only follows boxes the light hits from the root down, and a
        // leaf grown by a forced light may stick out of its parent
        if is_light {
            self.attach_to_reaching_leaves(id);
        }

        for leaf in reached {
            if self.is_live_leaf(leaf) {
                self.update_leaf(leaf, false);
            }
        }

        if root_grew {
            InsertOutcome::InsertedAndGrewRoot
        } else {
            InsertOutcome::Inserted
        }
    }

    /// Child whose center is nearer to `point` (squared distance, low wins ties).
    fn nearer_child(&self, point: Vec3, low: NodeKey, high: NodeKey) -> NodeKey {
        let d_low = self.nodes[low].aabb.center().distance_squared(point);
        let d_high = self.nodes[high].aabb.center().distance_squared(point);
        if d_high < d_low { high } else { low }
    }

    /// List every registered light whose volume reaches `leaf` and is not
    /// attached to it yet.
    fn attach_reaching_lights(&mut self, leaf: NodeKey) {
        let node = &self.nodes[leaf];
        let mut missing: Vec<ObjectId> = self
            .entries
            .iter()
            .filter(|(id, entry)| {
                entry.volume.is_light()
                    && !node.lights.contains(*id)
                    && entry.volume.intersects_aabb(&node.aabb)
            })
            .map(|(&id, _)| id)
            .collect();
        missing.sort_unstable();

        for id in missing {
            self.attach_light(leaf, id);
        }
    }

    /// Attach light `id` to every live leaf its volume reaches.
    fn attach_to_reaching_leaves(&mut self, id: ObjectId) {
        let Some(volume) = self.entries.get(&id).map(|entry| entry.volume) else {
            return;
        };
        for leaf in self.leaves() {
            let node = &self.nodes[leaf];
            if !node.lights.contains(&id) && volume.intersects_aabb(&node.aabb) {
                self.attach_light(leaf, id);
            }
        }
    }

    fn attach_light(&mut self, leaf: NodeKey, id: ObjectId) {
        self.nodes[leaf].lights.push(id);
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.leaves.push(leaf);
        }
    }

    fn is_live_leaf(&self, key: NodeKey) -> bool {
        self.nodes
            .get(key)
            .map_or(false, |node| node.is_live() && node.is_leaf())
    }

    // ===== REMOVAL =====

    /// Remove an object from every leaf that holds it.
    ///
    /// Returns `false` if the object was not registered.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        let Some(entry) = self.entries.remove(&id) else {
            return false;
        };

        for &leaf in &entry.leaves {
            if let Some(node) = self.nodes.get_mut(leaf) {
                node.objects.retain(|&other| other != id);
                node.lights.retain(|&other| other != id);
            }
        }

        // A merge triggered by one leaf may retire the next one
        for leaf in entry.leaves {
            if self.is_live_leaf(leaf) {
                self.update_leaf(leaf, true);
            }
        }

        true
    }

    // ===== LEAF REBALANCING =====

    fn update_leaf(&mut self, key: NodeKey, was_removed_from: bool) {
        debug_assert!(
            self.is_live_leaf(key),
            "update_leaf() called on a non-leaf or retired bvh node"
        );
        if !self.is_live_leaf(key) {
            return;
        }

        if was_removed_from {
            self.refit_leaf(key);
        }

        let node = &self.nodes[key];
        let count = node.objects.len();
        let max = self.settings.max_objects_per_node;

        if count > max && node.depth < self.settings.max_depth {
            self.split(key);
        } else if count <= max && key != self.root {
            self.try_merge(key);
        }
    }

    /// Shrink a leaf to its remaining bounded objects and drop the lights
    /// that no longer reach it.
    ///
    /// The root keeps its bounds: they define the global extent, which only
    /// a rebuild resets.
    fn refit_leaf(&mut self, key: NodeKey) {
        if key != self.root {
            let mut bounds = AABB::EMPTY;
            for id in &self.nodes[key].objects {
                if let Some(ObjectVolume::Bounded(aabb)) = self.entries.get(id).map(|e| e.volume) {
                    bounds.grow(&aabb);
                }
            }
            if !bounds.is_empty() {
                self.nodes[key].aabb = bounds;
            }
        }

        let aabb = self.nodes[key].aabb;
        let lights = std::mem::take(&mut self.nodes[key].lights);
        let mut kept = Vec::with_capacity(lights.len());

        for id in lights {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            if entry.volume.intersects_aabb(&aabb) {
                kept.push(id);
            } else {
                entry.leaves.retain(|&leaf| leaf != key);
            }
        }

        self.nodes[key].lights = kept;
    }

    /// Median split along the longest axis.
    fn split(&mut self, key: NodeKey) {
        let node = &self.nodes[key];
        let parent_aabb = node.aabb;
        let depth = node.depth + 1;
        let axis = parent_aabb.longest_axis();

        let mut objects = node.objects.clone();
        let mid = objects.len() / 2;

        let entries = &self.entries;
        let coord = |id: &ObjectId| entries.get(id).map_or(0.0, |e| e.volume.anchor()[axis]);
        objects.select_nth_unstable_by(mid, |a, b| coord(a).total_cmp(&coord(b)));
        let plane = coord(&objects[mid]);

        let (low_box, high_box) = parent_aabb.split_at(axis, plane);
        let min_size = self.settings.min_node_size;
        let too_small = |aabb: &AABB| aabb.size().min_element() < min_size;

        if too_small(&low_box) || too_small(&high_box) {
            bvh_trace!(
                LOG_SOURCE,
                "Split rejected at depth {}: children below min size {}",
                depth - 1,
                min_size
            );
            return;
        }

        let low = self.nodes.insert(BvhNode::new(low_box, Some(key), depth));
        let high = self.nodes.insert(BvhNode::new(high_box, Some(key), depth));

        let (low_objects, high_objects) = objects.split_at(mid);
        for (child, ids) in [(low, low_objects), (high, high_objects)] {
            for &id in ids {
                let Some(entry) = self.entries.get_mut(&id) else {
                    continue;
                };
                if let ObjectVolume::Bounded(aabb) = entry.volume {
                    self.nodes[child].aabb.grow(&aabb);
                }
                self.nodes[child].objects.push(id);
                entry.leaves.retain(|&leaf| leaf != key);
                entry.leaves.push(child);
            }
        }

        let lights = std::mem::take(&mut self.nodes[key].lights);
        for id in lights {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            entry.leaves.retain(|&leaf| leaf != key);
            for child in [low, high] {
                if entry.volume.intersects_aabb(&self.nodes[child].aabb) {
                    self.nodes[child].lights.push(id);
                    entry.leaves.push(child);
                }
            }
        }

        let node = &mut self.nodes[key];
        node.objects.clear();
        node.children = Some([low, high]);

        bvh_trace!(
            LOG_SOURCE,
            "Split node at depth {} on axis {} ({} | {} objects)",
            depth - 1,
            axis,
            low_objects.len(),
            high_objects.len()
        );

        self.update_leaf(low, false);
        if self.is_live_leaf(high) {
            self.update_leaf(high, false);
        }
    }

    /// Conjunct: fold this leaf and its sibling back into their parent.
    fn try_merge(&mut self, key: NodeKey) {
        let Some(parent) = self.nodes[key].parent else {
            return;
        };
        let Some([low, high]) = self.nodes[parent].children else {
            return;
        };
        let sibling = if low == key { high } else { low };
        if !self.is_live_leaf(sibling) {
            return;
        }

        let combined = self.nodes[low].objects.len() + self.nodes[high].objects.len();
        if combined > self.settings.max_objects_per_node {
            return;
        }

        let mut objects = std::mem::take(&mut self.nodes[low].objects);
        objects.append(&mut self.nodes[high].objects);
        let mut lights = std::mem::take(&mut self.nodes[low].lights);
        lights.append(&mut self.nodes[high].lights);
        dedup_preserving_order(&mut objects);
        dedup_preserving_order(&mut lights);

        for child in [low, high] {
            self.nodes[child].state = NodeState::PendingDeletion;
            self.nodes_to_delete.push(child);
        }

        for id in objects.iter().chain(lights.iter()) {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.leaves.retain(|&leaf| leaf != low && leaf != high);
                if !entry.leaves.contains(&parent) {
                    entry.leaves.push(parent);
                }
            }
        }

        let merged_aabb = self.nodes[low].aabb.union(&self.nodes[high].aabb);
        let parent_node = &mut self.nodes[parent];
        parent_node.aabb.grow(&merged_aabb);
        parent_node.children = None;
        parent_node.objects = objects;
        parent_node.lights = lights;

        bvh_trace!(
            LOG_SOURCE,
            "Merged leaves into parent at depth {} ({} objects)",
            parent_node.depth,
            combined
        );

        // The parent box spans the gap between its former children
        self.attach_reaching_lights(parent);
        self.update_leaf(parent, false);
    }

    // ===== GARBAGE COLLECTION / REBUILD =====

    /// Free every node retired by a merge since the last call.
    ///
    /// Returns the number of nodes freed.
    pub fn collect_garbage(&mut self) -> usize {
        let mut freed = 0;

        for key in std::mem::take(&mut self.nodes_to_delete) {
            debug_assert!(self.nodes.get(key).map_or(true, |node| !node.is_live()));

            // Retiring a node retires its whole subtree
            let mut stack = vec![key];
            while let Some(key) = stack.pop() {
                if let Some(node) = self.nodes.remove(key) {
                    if let Some(children) = node.children {
                        stack.extend(children);
                    }
                    freed += 1;
                }
            }
        }

        if freed > 0 {
            bvh_trace!(LOG_SOURCE, "Freed {} retired nodes", freed);
        }
        freed
    }

    /// Drop every node and entry and re-insert `objects` under a single
    /// root sized to all of them.
    pub fn rebuild<I>(&mut self, objects: I, settings: BvhSettings)
    where
        I: IntoIterator<Item = Arc<dyn BvhObject>>,
    {
        let items: Vec<(Arc<dyn BvhObject>, ObjectVolume)> = objects
            .into_iter()
            .map(|object| {
                let volume = object.volume();
                (object, volume)
            })
            .filter(|(_, volume)| volume.is_indexed())
            .collect();

        let mut root_bounds = AABB::EMPTY;
        for (_, volume) in &items {
            if let Some(growth) = volume.growth_bounds() {
                root_bounds.grow(&growth);
            }
        }

        self.settings = settings;
        self.nodes.clear();
        self.entries.clear();
        self.nodes_to_delete.clear();
        self.root = self.nodes.insert(BvhNode::new(root_bounds, None, 0));

        for (object, volume) in items {
            let outcome = self.insert(object, volume);
            debug_assert!(outcome != InsertOutcome::InsertedAndGrewRoot);
        }
    }

    // ===== CONSISTENCY CHECK =====

    /// Walk the tree and check every structural and back-reference invariant.
    pub fn validate(&self) -> Result<()> {
        let violation = |msg: String| Err(Error::InvariantViolation(msg));

        let root = &self.nodes[self.root];
        if root.parent.is_some() || !root.is_live() {
            return violation("root has a parent or is retired".to_string());
        }

        let mut reachable = 0usize;
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            reachable += 1;
            let node = &self.nodes[key];
            if !node.is_live() {
                return violation(format!("retired node {:?} still reachable", key));
            }

            if let Some(children) = node.children {
                if !node.objects.is_empty() || !node.lights.is_empty() {
                    return violation(format!("internal node {:?} holds objects", key));
                }
                for child in children {
                    let Some(child_node) = self.nodes.get(child) else {
                        return violation(format!("node {:?} has a freed child", key));
                    };
                    if child_node.parent != Some(key) || child_node.depth != node.depth + 1 {
                        return violation(format!("child {:?} has wrong parent or depth", child));
                    }
                    stack.push(child);
                }
                continue;
            }

            for id in &node.objects {
                match self.entries.get(id) {
                    Some(entry) if !entry.volume.is_light() && entry.leaves == [key] => {
                        if let ObjectVolume::Bounded(bounds) = entry.volume {
                            if !node.aabb.contains(&bounds) {
                                return violation(format!("leaf {:?} does not cover object {}", key, id));
                            }
                        }
                    }
                    _ => return violation(format!("object {} in leaf {:?} does not point back", id, key)),
                }
            }
            for id in &node.lights {
                match self.entries.get(id) {
                    Some(entry) if entry.volume.is_light() && entry.leaves.contains(&key) => {}
                    _ => return violation(format!("light {} in leaf {:?} does not point back", id, key)),
                }
            }
            for (id, entry) in &self.entries {
                if entry.volume.is_light() && entry.volume.intersects_aabb(&node.aabb) && !node.lights.contains(id) {
                    return violation(format!("light {} reaches leaf {:?} but is not listed", id, key));
                }
            }
        }

        if reachable + self.nodes_to_delete.len() != self.nodes.len() {
            return violation(format!(
                "{} nodes in arena, {} reachable, {} pending deletion",
                self.nodes.len(),
                reachable,
                self.nodes_to_delete.len()
            ));
        }

        for (id, entry) in &self.entries {
            if !entry.volume.is_light() && entry.leaves.len() != 1 {
                return violation(format!("bounded object {} holds {} leaves", id, entry.leaves.len()));
            }
            let mut seen = FxHashSet::default();
            for &leaf in &entry.leaves {
                if !seen.insert(leaf) {
                    return violation(format!("object {} lists leaf {:?} twice", id, leaf));
                }
                let listed = self.nodes.get(leaf).map_or(false, |node| {
                    node.is_live()
                        && node.is_leaf()
                        && (node.objects.contains(id) || node.lights.contains(id))
                });
                if !listed {
                    return violation(format!("object {} points to leaf {:?} that does not hold it", id, leaf));
                }
            }
        }

        Ok(())
    }
}

/// Remove duplicate ids, keeping the first occurrence.
fn dedup_preserving_order(ids: &mut Vec<ObjectId>) {
    let mut seen = FxHashSet::default();
    ids.retain(|id| seen.insert(*id));
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
