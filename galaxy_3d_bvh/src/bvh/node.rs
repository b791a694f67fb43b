/// BVH node stored in the tree arena.

use slotmap::new_key_type;
use crate::geometry::AABB;
use super::object::ObjectId;

new_key_type! {
    /// Stable handle of a node in the tree arena.
    ///
    /// A key stays valid until the node is freed (garbage collection after a
    /// merge, or a rebuild). Stale keys simply fail to resolve.
    pub struct NodeKey;
}

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Live,
    /// Merged into its parent; freed on the next `Bvh::update()`
    PendingDeletion,
}

/// Node of the hierarchy. A node is a leaf iff it has no children.
#[derive(Debug, Clone)]
pub struct BvhNode {
    /// Union of everything stored in this node and its descendants
    pub aabb: AABB,
    /// Both children or none: `[low, high]` halves of the split axis
    pub children: Option<[NodeKey; 2]>,
    /// `None` for the root
    pub parent: Option<NodeKey>,
    /// Root is depth 0
    pub depth: u32,
    /// Bounded objects (leaves only)
    pub objects: Vec<ObjectId>,
    /// Lights whose influence reaches this leaf (leaves only)
    pub lights: Vec<ObjectId>,
    /// Retired by a merge, freed by the next `collect_garbage()`
    pub state: NodeState,
    /// Frustum scratch: an ancestor was classified fully inside.
    /// Only meaningful during a single traversal.
    pub(crate) inside_frustum: bool,
}

impl BvhNode {
    pub(crate) fn new(aabb: AABB, parent: Option<NodeKey>, depth: u32) -> Self {
        Self {
            aabb,
            children: None,
            parent,
            depth,
            objects: Vec::new(),
            lights: Vec::new(),
            state: NodeState::Live,
            inside_frustum: false,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.state == NodeState::Live
    }
}
