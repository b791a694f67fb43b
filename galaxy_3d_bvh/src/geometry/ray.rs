/// Ray used for object picking.

use glam::Vec3;
use super::aabb::AABB;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// World-space origin
    pub origin: Vec3,
    /// Direction (unit length expected for distances in world units)
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Point at parametric distance `t`.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Slab test against an AABB.
    ///
    /// Returns the entry distance, which is negative when the origin is
    /// inside the box. `None` when the ray misses or the box is entirely
    /// behind the origin.
    pub fn intersect_aabb(&self, aabb: &AABB) -> Option<f32> {
        let inv_dir = self.direction.recip();

        let t1 = (aabb.min - self.origin) * inv_dir;
        let t2 = (aabb.max - self.origin) * inv_dir;

        let t_near = t1.min(t2);
        let t_far = t1.max(t2);

        let t_min = t_near.x.max(t_near.y).max(t_near.z);
        let t_max = t_far.x.min(t_far.y).min(t_far.z);

        if t_max < 0.0 || t_min > t_max {
            return None;
        }

        Some(t_min)
    }
}

#[cfg(test)]
#[path = "ray_tests.rs"]
mod tests;
