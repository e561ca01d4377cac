//! Level of detail policies for the frustum walk
//!
//! A policy decides whether a visible internal node is detailed enough to be
//! rendered as is, or whether the walk must descend into its children.

use crate::core::config::LodConfig;
use crate::core::types::UVec3;

/// What a policy gets to see of a visible internal node
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodQuery {
    /// Depth of the node, root = 0
    pub level: u32,
    /// Deepest level below the node
    pub max_level: u32,
    /// Signed view distance to the nearest corner of the brick
    pub distance: f32,
    /// Brick extent in texels
    pub texture_size: UVec3,
}

impl LodQuery {
    /// Levels between this node and its deepest leaf
    pub fn levels_below(&self) -> u32 {
        self.max_level.saturating_sub(self.level)
    }
}

pub trait LodPolicy {
    /// True if the node's own brick is detailed enough at this distance
    fn is_correct_lod(&self, query: &LodQuery) -> bool;
}

/// Always refine down to the leaves
#[derive(Clone, Copy, Debug, Default)]
pub struct LeafOnly;

impl LodPolicy for LeafOnly {
    fn is_correct_lod(&self, _query: &LodQuery) -> bool {
        false
    }
}

/// Accept coarser bricks the further away they are
#[derive(Clone, Copy, Debug)]
pub struct DistanceLod {
    pub base_distance: f32,
}

impl LodPolicy for DistanceLod {
    fn is_correct_lod(&self, query: &LodQuery) -> bool {
        let levels_below = query.levels_below();
        levels_below == 0 || query.distance >= required_distance(self.base_distance, levels_below)
    }
}

/// Distance at which a brick `levels_below` levels above the leaves may be
/// rendered in place of its children.
///
/// Each level doubles the distance.
///
/// # Examples
/// ```
/// use volbrick::octree::lod::required_distance;
///
/// assert_eq!(required_distance(2.0, 1), 2.0);
/// assert_eq!(required_distance(2.0, 3), 8.0);
/// ```
pub fn required_distance(base_distance: f32, levels_below: u32) -> f32 {
    base_distance * (1u64 << levels_below.saturating_sub(1).min(63)) as f32
}

/// Policy described by a configuration
pub fn policy_from_config(config: &LodConfig) -> Box<dyn LodPolicy> {
    match *config {
        LodConfig::LeafOnly => Box::new(LeafOnly),
        LodConfig::Distance { base_distance } => Box::new(DistanceLod { base_distance }),
    }
}
