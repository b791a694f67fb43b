//! Scene object stand-in shared by the BVH unit tests.

use std::sync::{Arc, Mutex};
use glam::Vec3;
use crate::geometry::{AABB, BoundingSphere, Frustum};
use super::object::{BvhObject, ObjectId, ObjectVolume};

pub(crate) struct TestObject {
    id: ObjectId,
    volume: Mutex<ObjectVolume>,
}

impl TestObject {
    pub(crate) fn new(id: u64, volume: ObjectVolume) -> Arc<Self> {
        Arc::new(Self { id: ObjectId(id), volume: Mutex::new(volume) })
    }

    /// Axis-aligned cube
    pub(crate) fn cube(id: u64, center: Vec3, half: f32) -> Arc<Self> {
        Self::new(id, ObjectVolume::Bounded(AABB::from_center_half_extents(center, Vec3::splat(half))))
    }

    pub(crate) fn point_light(id: u64, center: Vec3, radius: f32) -> Arc<Self> {
        Self::new(id, ObjectVolume::PointLight { sphere: BoundingSphere::new(center, radius) })
    }

    /// Spot light whose cone is approximated by a box frustum over `bounds`
    pub(crate) fn spot_light(id: u64, position: Vec3, bounds: AABB) -> Arc<Self> {
        Self::new(id, ObjectVolume::SpotLight {
            position,
            bounds,
            frustum: Frustum::from_aabb(&bounds),
        })
    }

    pub(crate) fn sky(id: u64) -> Arc<Self> {
        Self::new(id, ObjectVolume::NotIndexed)
    }

    pub(crate) fn set_volume(&self, volume: ObjectVolume) {
        *self.volume.lock().unwrap() = volume;
    }

    pub(crate) fn move_cube(&self, center: Vec3, half: f32) {
        self.set_volume(ObjectVolume::Bounded(AABB::from_center_half_extents(center, Vec3::splat(half))));
    }
}

impl BvhObject for TestObject {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn bounding_box(&self) -> AABB {
        match *self.volume.lock().unwrap() {
            ObjectVolume::Bounded(aabb) => aabb,
            ObjectVolume::SpotLight { bounds, .. } => bounds,
            ObjectVolume::PointLight { sphere } => sphere.bounding_box(),
            ObjectVolume::NotIndexed => AABB::EMPTY,
        }
    }

    fn volume(&self) -> ObjectVolume {
        *self.volume.lock().unwrap()
    }
}

/// Upcast helper for APIs taking `Arc<dyn BvhObject>`.
pub(crate) fn dyn_obj(object: &Arc<TestObject>) -> Arc<dyn BvhObject> {
    object.clone()
}

/// `count` cubes of half-size 5 spaced 40 units apart along X.
pub(crate) fn row_of_cubes(first_id: u64, count: usize) -> Vec<Arc<TestObject>> {
    (0..count)
        .map(|i| TestObject::cube(first_id + i as u64, Vec3::new(i as f32 * 40.0, 0.0, 0.0), 5.0))
        .collect()
}
