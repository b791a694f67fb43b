/// Bvh - per-scene spatial index façade
///
/// Owns the tree and the shared change queues. Producers queue requests
/// through `change_queues()` from any thread; the owning thread applies them
/// once per frame with `update()` and then runs its queries.

use std::sync::Arc;
use glam::Vec3;
use crate::error::Result;
use crate::geometry::{Frustum, Ray, AABB};
use crate::{bvh_debug, bvh_error, bvh_info};
use super::change_queue::ChangeQueues;
use super::node::NodeKey;
use super::object::{BvhObject, ObjectId};
use super::query::{DebugBox, DistributionQuality, PickData, QueryStats};
use super::settings::BvhSettings;
use super::tree::{InsertOutcome, Tree};

const LOG_SOURCE: &str = "galaxy3d::bvh::Bvh";

/// Spatial index of one scene.
///
/// Requests may come from any thread; `update()`, `rebuild()` and the
/// queries run on the thread that owns the `Bvh`.
pub struct Bvh {
    /// Current hierarchy
    tree: Tree,
    /// Requests waiting for the next `update()`, shared with producers
    queues: Arc<ChangeQueues>,
    /// Configuration applied by the next `rebuild()`
    settings: BvhSettings,
}

impl Default for Bvh {
    fn default() -> Self {
        let settings = BvhSettings::default();
        Self {
            tree: Tree::new(settings),
            queues: Arc::new(ChangeQueues::new()),
            settings,
        }
    }
}

impl Bvh {
    /// Create an empty BVH
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSettings` if `settings` fail validation.
    pub fn new(settings: BvhSettings) -> Result<Self> {
        if let Err(err) = settings.validate() {
            bvh_error!(LOG_SOURCE, "Cannot create BVH: {}", err);
            return Err(err);
        }

        Ok(Self {
            tree: Tree::new(settings),
            queues: Arc::new(ChangeQueues::new()),
            settings,
        })
    }

    // ===== CONFIGURATION =====

    /// Settings applied by the next `rebuild()`
    pub fn settings(&self) -> &BvhSettings {
        &self.settings
    }

    /// Settings the current tree was built with
    pub fn active_settings(&self) -> &BvhSettings {
        self.tree.settings()
    }

    /// Store new settings. They take effect on the next `rebuild()`.
    pub fn set_settings(&mut self, settings: BvhSettings) -> Result<()> {
        if let Err(err) = settings.validate() {
            bvh_error!(LOG_SOURCE, "Rejected BVH settings: {}", err);
            return Err(err);
        }
        self.settings = settings;
        Ok(())
    }

    // ===== CHANGE REQUESTS =====

    /// Shared handle for producer threads
    pub fn change_queues(&self) -> Arc<ChangeQueues> {
        self.queues.clone()
    }

    /// Queue `object` for insertion on the next `update()`.
    ///
    /// Returns `false` if the object is not indexed or already queued.
    pub fn request_add(&self, object: Arc<dyn BvhObject>) -> bool {
        self.queues.request_add(object)
    }

    /// Queue `object` for removal on the next `update()`.
    pub fn request_remove(&self, object: Arc<dyn BvhObject>) -> bool {
        self.queues.request_remove(object)
    }

    /// Queue `object` for re-insertion with its current volume. Call it
    /// after a move, a resize, or a light volume change.
    pub fn request_update(&self, object: Arc<dyn BvhObject>) -> bool {
        self.queues.request_update(object)
    }

    // ===== FRAME UPDATE =====

    /// Apply every queued request.
    ///
    /// Order: removals, updates (remove + re-insert with a fresh volume),
    /// then additions. Nodes merged away by removals are freed before the
    /// next phase. If an insertion grows the root the tree is rebuilt around
    /// the new extent, with the additions still queued folded into it.
    pub fn update(&mut self) {
        if self.queues.is_empty() {
            return;
        }

        let removes = self.queues.drain_removes();
        for object in &removes {
            self.tree.remove(object.id());
        }
        let mut freed = self.tree.collect_garbage();

        let mut to_insert = Vec::new();
        let updates = self.queues.drain_updates();
        for object in updates.iter() {
            // An object removed earlier this frame stays removed
            if self.tree.remove(object.id()) {
                to_insert.push(object.clone());
            } else {
                bvh_debug!(LOG_SOURCE, "Update ignored for unregistered object {}", object.id());
            }
        }
        freed += self.tree.collect_garbage();

        let adds = self.queues.drain_adds();
        let add_count = adds.len();
        to_insert.extend(adds);

        let mut rebuilt = false;
        let mut pending = to_insert.into_iter();
        while let Some(object) = pending.next() {
            if self.tree.add(object) == InsertOutcome::InsertedAndGrewRoot {
                let deferred: Vec<_> = pending.collect();
                self.rebuild_with(deferred);
                rebuilt = true;
                break;
            }
        }

        bvh_debug!(
            LOG_SOURCE,
            "Update: {} removed, {} updated, {} added, {} nodes freed{}",
            removes.len(),
            updates.len(),
            add_count,
            freed,
            if rebuilt { ", rebuilt" } else { "" }
        );
    }

    /// Rebuild the whole tree from the registered objects with the
    /// configured settings.
    pub fn rebuild(&mut self) {
        self.rebuild_with(Vec::new());
    }

    fn rebuild_with(&mut self, extra: Vec<Arc<dyn BvhObject>>) {
        let mut objects = self.tree.objects();
        objects.extend(extra);
        self.tree.rebuild(objects, self.settings);

        let quality = self.tree.distribution_quality();
        bvh_info!(
            LOG_SOURCE,
            "BVH rebuilt: {} objects, {} nodes, {} leaves (distribution {:.2})",
            quality.total_objects,
            self.tree.node_count(),
            self.leaf_count(),
            quality.ratio
        );
    }

    // ===== QUERIES =====

    /// Nearest object hit by `ray`, skipping `ignore`
    pub fn pick_ray(&mut self, ray: &Ray, ignore: &[ObjectId]) -> Option<PickData> {
        self.tree.pick_ray(ray, ignore)
    }

    /// Shorthand for `pick_ray` from an origin and direction
    pub fn pick_ray_from(&mut self, origin: Vec3, direction: Vec3, ignore: &[ObjectId]) -> Option<PickData> {
        self.tree.pick_ray(&Ray::new(origin, direction), ignore)
    }

    /// Objects inside `frustum`, skipping `ignore`.
    ///
    /// With `pick_partially_inside` objects straddling a plane count too;
    /// otherwise their whole box must be inside.
    pub fn pick_frustum(
        &mut self,
        frustum: &Frustum,
        ignore: &[ObjectId],
        pick_partially_inside: bool,
    ) -> Vec<PickData> {
        self.tree.pick_frustum(frustum, ignore, pick_partially_inside)
    }

    /// Bounded objects visible from `frustum`
    pub fn frustum_test(&mut self, frustum: &Frustum) -> Vec<Arc<dyn BvhObject>> {
        self.tree.frustum_test(frustum)
    }

    /// Lights reaching the region visible from `frustum`
    pub fn frustum_test_lights(&mut self, frustum: &Frustum) -> Vec<Arc<dyn BvhObject>> {
        self.tree.frustum_test_lights(frustum)
    }

    /// Counters of the last ray or frustum query
    pub fn last_query_stats(&self) -> QueryStats {
        self.tree.last_stats
    }

    // ===== DIAGNOSTICS =====

    /// One colored box per live leaf, for debug drawing.
    pub fn debug_boxes(&self) -> Vec<DebugBox> {
        self.tree.debug_boxes()
    }

    /// Leaf entries per registered object.
    pub fn distribution_quality(&self) -> DistributionQuality {
        self.tree.distribution_quality()
    }

    /// Check every tree invariant
    pub fn validate(&self) -> Result<()> {
        let result = self.tree.validate();
        if let Err(err) = &result {
            bvh_error!(LOG_SOURCE, "{}", err);
        }
        result
    }

    /// Nodes in the arena, including the ones waiting to be freed.
    pub fn node_count(&self) -> usize {
        self.tree.node_count()
    }

    /// Live leaves reachable from the root.
    pub fn leaf_count(&self) -> usize {
        self.tree.leaves().len()
    }

    /// Registered objects (bounded and lights)
    pub fn object_count(&self) -> usize {
        self.tree.object_count()
    }

    /// Extent of the root node.
    pub fn root_bounds(&self) -> AABB {
        self.tree.root_bounds()
    }

    /// Is `id` currently registered? Queued requests do not count.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.tree.contains(id)
    }

    /// Leaves currently holding `id`
    pub fn leaves_of(&self, id: ObjectId) -> &[NodeKey] {
        self.tree.leaves_of(id)
    }

    /// Read access to the underlying tree
    pub fn tree(&self) -> &Tree {
        &self.tree
    }
}

#[cfg(test)]
#[path = "bvh_tests.rs"]
mod tests;
