/// Tunable BVH parameters.

use crate::error::{Error, Result};

/// Leaf occupancy and size limits.
///
/// Changing the settings of a live `Bvh` only takes effect on the next
/// `Bvh::rebuild()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhSettings {
    /// Bounded objects a leaf may hold before a split is attempted
    pub max_objects_per_node: usize,
    /// Smallest extent, on any axis, a split child may have
    pub min_node_size: f32,
    /// Leaves at this depth never split (root = 0)
    pub max_depth: u32,
}

impl Default for BvhSettings {
    fn default() -> Self {
        Self {
            max_objects_per_node: 5,
            min_node_size: 10.0,
            max_depth: 24,
        }
    }
}

impl BvhSettings {
    /// Check the parameters can drive a tree.
    pub fn validate(&self) -> Result<()> {
        if self.max_objects_per_node == 0 {
            return Err(Error::InvalidSettings(
                "max_objects_per_node must be at least 1".to_string(),
            ));
        }
        if !self.min_node_size.is_finite() || self.min_node_size < 0.0 {
            return Err(Error::InvalidSettings(format!(
                "min_node_size must be finite and >= 0 (got {})",
                self.min_node_size
            )));
        }
        if self.max_depth == 0 {
            return Err(Error::InvalidSettings(
                "max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
