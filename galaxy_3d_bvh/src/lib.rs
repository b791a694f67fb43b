/*!
# Galaxy 3D BVH

Dynamic bounding volume hierarchy for Galaxy 3D scenes.

Spatially indexes the movable objects of a scene to accelerate the two
queries a frame needs: nearest-hit ray picking and frustum culling. The tree
stays valid while objects are continuously added, removed and moved, keeps
leaf occupancy bounded, and indexes lights by the region they influence.

## Architecture

- **Bvh**: Owning façade, applies queued changes once per frame and runs queries
- **ChangeQueues**: Thread-safe add / remove / update request queues
- **Tree**: Arena-backed node hierarchy with split / merge rebalancing
- **BvhObject**: Trait implemented by scene objects and lights
- **geometry**: AABB, sphere, ray and frustum primitives

Producers on any thread hold an `Arc<ChangeQueues>`. The thread owning the
`Bvh` calls `update()` then queries; both take `&mut Bvh`, so structural
changes and queries never overlap.
*/

// Internal modules
mod error;
pub mod log;
pub mod geometry;
pub mod bvh;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Logging sub-module (types only, macros live at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger, set_logger, reset_logger};
    }

    // Geometry sub-module
    pub mod geometry {
        pub use crate::geometry::*;
    }

    // BVH sub-module
    pub mod bvh {
        pub use crate::bvh::*;
    }
}

// Re-export math library at crate root
pub use glam;
