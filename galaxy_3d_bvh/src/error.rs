//! Error types for the Galaxy3D BVH
//!
//! Structural invariant breaches are debug assertions, not errors. The
//! variants below cover what a caller can act on: rejected configuration
//! and the report produced by an explicit consistency check.

use std::fmt;

/// Result type for BVH operations
pub type Result<T> = std::result::Result<T, Error>;

/// BVH errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Tunable parameters rejected by `BvhSettings::validate`
    InvalidSettings(String),

    /// A tree or back-reference invariant does not hold (reported by `Bvh::validate`)
    InvariantViolation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidSettings(msg) => write!(f, "Invalid BVH settings: {}", msg),
            Error::InvariantViolation(msg) => write!(f, "BVH invariant violated: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
