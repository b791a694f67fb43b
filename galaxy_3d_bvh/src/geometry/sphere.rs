/// Bounding sphere (point light influence volume).

use glam::Vec3;
use super::aabb::AABB;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// World-space center
    pub center: Vec3,
    /// Influence radius
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Sphere/AABB overlap: distance from the center to the closest point
    /// of the box, compared against the radius. Touching counts.
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        let closest = self.center.clamp(aabb.min, aabb.max);
        closest.distance_squared(self.center) <= self.radius * self.radius
    }

    /// Tight box around the sphere.
    pub fn bounding_box(&self) -> AABB {
        AABB::from_center_half_extents(self.center, Vec3::splat(self.radius))
    }
}
