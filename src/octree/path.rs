//! Addressing of octree nodes by octant path

use std::fmt;

use crate::core::types::UVec3;

/// Octant bit pattern of child `index` (x = bit 0, y = bit 1, z = bit 2)
pub fn octant_pattern(index: usize) -> UVec3 {
    UVec3::new(index as u32 & 1, (index as u32 >> 1) & 1, (index as u32 >> 2) & 1)
}

/// Sequence of octant indices leading from the root to a node
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<u8>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path of child `octant` (0..8) of this node
    pub fn child(&self, octant: usize) -> Self {
        debug_assert!(octant < 8);
        let mut octants = self.0.clone();
        octants.push(octant as u8);
        Self(octants)
    }

    /// Depth of the addressed node, root = 0
    pub fn level(&self) -> u32 {
        self.0.len() as u32
    }

    pub fn octants(&self) -> &[u8] {
        &self.0
    }

    /// Strict ancestor test
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r")?;
        for octant in &self.0 {
            write!(f, "/{}", octant)?;
        }
        Ok(())
    }
}
