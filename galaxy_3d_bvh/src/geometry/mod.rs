//! Geometry primitives consumed by the BVH.
//!
//! Boxes, spheres, rays and frusta, plus the intersection predicates the
//! tree routes and queries with. Plain `Copy` data, no allocation.

mod aabb;
mod frustum;
mod ray;
mod sphere;

pub use aabb::AABB;
pub use frustum::{Frustum, FrustumTest};
pub use ray::Ray;
pub use sphere::BoundingSphere;
