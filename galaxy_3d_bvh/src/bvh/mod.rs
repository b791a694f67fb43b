//! Dynamic bounding volume hierarchy over scene objects.
//!
//! Two kinds of objects are indexed:
//! - bounded objects, stored in exactly one leaf
//! - spot and point lights, stored in every leaf their influence reaches
//!
//! The tree keeps leaf occupancy bounded by splitting crowded leaves and
//! merging sparse siblings as objects come and go. `Bvh` wraps it with
//! thread-safe change queues and per-frame application.

mod bvh;
mod change_queue;
mod node;
mod object;
mod query;
mod settings;
mod tree;

#[cfg(test)]
pub(crate) mod test_support;

pub use bvh::Bvh;
pub use change_queue::ChangeQueues;
pub use node::{BvhNode, NodeKey, NodeState};
pub use object::{BvhObject, ObjectId, ObjectKind, ObjectVolume};
pub use query::{DebugBox, DistributionQuality, PickData, QueryStats};
pub use settings::BvhSettings;
pub use tree::{InsertOutcome, Tree};
