//! Residency and storage statistics

use std::fmt;

use crate::gpu::BrickTexture;
use super::node::VolumeNode;

/// Snapshot of a tree's shape and memory use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OctreeStats {
    pub nodes: usize,
    pub leaves: usize,
    /// Nodes whose region has a zero extent
    pub empty_nodes: usize,
    pub resident_bricks: usize,
    /// Level 0 bytes of all resident bricks
    pub resident_bytes: usize,
    /// Uncompressed bytes held by backing stores
    pub logical_bytes: usize,
    /// Bytes backing stores actually occupy
    pub stored_bytes: usize,
    pub max_level: u32,
}

impl OctreeStats {
    /// Walk a subtree and tally it up
    pub fn collect<T: BrickTexture>(root: &VolumeNode<T>) -> Self {
        let mut stats = Self::default();
        stats.visit(root);
        stats
    }

    fn visit<T: BrickTexture>(&mut self, node: &VolumeNode<T>) {
        self.nodes += 1;
        if node.is_leaf() {
            self.leaves += 1;
        }
        if node.is_empty() {
            self.empty_nodes += 1;
        }
        if let Some(brick) = node.brick() {
            self.resident_bricks += 1;
            self.resident_bytes += brick.byte_size();
        }
        self.logical_bytes += node.store_size();
        self.stored_bytes += node.stored_bytes();
        self.max_level = self.max_level.max(node.level());

        for child in node.iter_children() {
            self.visit(child);
        }
    }
}

impl fmt::Display for OctreeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nodes ({} leaves, {} empty, depth {}), {} resident bricks ({:.1} MB), {:.1} MB stored ({:.1} MB raw)",
            self.nodes,
            self.leaves,
            self.empty_nodes,
            self.max_level,
            self.resident_bricks,
            self.resident_bytes as f64 / (1024.0 * 1024.0),
            self.stored_bytes as f64 / (1024.0 * 1024.0),
            self.logical_bytes as f64 / (1024.0 * 1024.0),
        )
    }
}
