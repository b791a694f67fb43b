/// Indexed object types.
///
/// The BVH never owns scene objects. It holds `Arc<dyn BvhObject>` handles
/// and the volume each object reported when it was inserted.

use std::fmt;
use glam::Vec3;
use crate::geometry::{AABB, BoundingSphere, Frustum, Ray};

// ===== OBJECT ID =====

/// Stable unique id supplied by the host scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ===== OBJECT KIND =====

/// Type tag of an indexed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Opaque object, lives in at most one leaf
    Bounded,
    /// Cone-shaped light influence (box + frustum)
    SpotLight,
    /// Spherical light influence
    PointLight,
    /// Sky boxes and other objects the BVH ignores
    NotIndexed,
}

// ===== OBJECT VOLUME =====

/// World-space volume used to route an object through the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectVolume {
    /// Tight world AABB of a bounded object
    Bounded(AABB),
    /// Spot light: world position, AABB of the cone, cone frustum
    SpotLight {
        position: Vec3,
        bounds: AABB,
        frustum: Frustum,
    },
    /// Point light influence sphere
    PointLight {
        sphere: BoundingSphere,
    },
    /// Not indexed at all
    NotIndexed,
}

impl ObjectVolume {
    /// Type tag of this volume.
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectVolume::Bounded(_) => ObjectKind::Bounded,
            ObjectVolume::SpotLight { .. } => ObjectKind::SpotLight,
            ObjectVolume::PointLight { .. } => ObjectKind::PointLight,
            ObjectVolume::NotIndexed => ObjectKind::NotIndexed,
        }
    }

    /// Spot and point lights.
    pub fn is_light(&self) -> bool {
        matches!(self, ObjectVolume::SpotLight { .. } | ObjectVolume::PointLight { .. })
    }

    pub fn is_indexed(&self) -> bool {
        !matches!(self, ObjectVolume::NotIndexed)
    }

    /// Shape-vs-box test used for child routing and light re-testing.
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        match self {
            ObjectVolume::Bounded(bounds) => bounds.intersects(aabb),
            ObjectVolume::SpotLight { bounds, frustum, .. } => {
                bounds.intersects(aabb) && frustum.intersects_aabb(aabb)
            }
            ObjectVolume::PointLight { sphere } => sphere.intersects_aabb(aabb),
            ObjectVolume::NotIndexed => false,
        }
    }

    /// Region a node must cover once the object is inserted below it.
    ///
    /// Lights only contribute their position: their influence volume may be
    /// far larger than anything they actually light.
    pub fn growth_bounds(&self) -> Option<AABB> {
        match self {
            ObjectVolume::Bounded(bounds) => Some(*bounds),
            ObjectVolume::SpotLight { position, .. } => Some(AABB::from_point(*position)),
            ObjectVolume::PointLight { sphere } => Some(AABB::from_point(sphere.center)),
            ObjectVolume::NotIndexed => None,
        }
    }

    /// Reference point for nearest-child tie-breaks and median splits.
    pub fn anchor(&self) -> Vec3 {
        match self {
            ObjectVolume::Bounded(bounds) => bounds.center(),
            ObjectVolume::SpotLight { position, .. } => *position,
            ObjectVolume::PointLight { sphere } => sphere.center,
            ObjectVolume::NotIndexed => Vec3::ZERO,
        }
    }
}

// ===== BVH OBJECT TRAIT =====

/// A scene object the BVH can index.
///
/// Implemented by the host scene. Lights must refresh whatever their
/// `volume()` reads (shadow camera, cached cone, ...) before requesting an
/// add or update; the BVH samples the volume once per insertion.
pub trait BvhObject: Send + Sync {
    /// Stable unique id
    fn id(&self) -> ObjectId;

    /// World-space bounding box
    fn bounding_box(&self) -> AABB;

    /// Routing volume. Defaults to a bounded object.
    fn volume(&self) -> ObjectVolume {
        ObjectVolume::Bounded(self.bounding_box())
    }

    /// Distance along `ray` to the first hit, if any.
    ///
    /// Defaults to the world AABB. Meshes override this with a triangle test.
    fn ray_intersection(&self, ray: &Ray) -> Option<f32> {
        ray.intersect_aabb(&self.bounding_box())
    }
}
