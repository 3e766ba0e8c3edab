//! Feature tree nodes and the per-cell arena that stores them.
//!
//! Per the design notes, the "tree" per cell is realized as an arena of nodes indexed by
//! [`FeatureId`], each carrying an explicit parent pointer and refcount rather than a
//! pointer-chasing tree structure. Using an `FxHashMap<FeatureId, FeatureNode>` as the arena
//! (rather than a hand-rolled slab with a free-list) gets the same "pruning returns the slot"
//! property at the idiomatic-Rust level: removing an entry lets the allocator reclaim it, and
//! ids are never reused since allocation is driven by a single monotonically increasing
//! counter owned by the map (see [`crate::map::dpmap::DpMap`]), not by arena occupancy.

use smallvec::SmallVec;

use crate::new_fast_map;
use crate::numeric_types::{FeatureId, Real, Timestamp};
use crate::FastMap;

/// The payload that distinguishes a depth-tree node from an obstacle-tree node. Both share
/// the common bookkeeping fields in [`FeatureNode`] (spec.md's unified node description);
/// this enum carries just the part that differs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeData {
    /// Fused depth observation: running mean and variance from inverse-variance fusion.
    Depth { mean: Real, variance: Real },
    /// Obstacle observation: vertical span `[zmin, zmax]` the feature has been seen to occupy.
    Obstacle { span: (Real, Real) },
}

/// One node in a cell's depth or obstacle feature tree.
#[derive(Debug, Clone)]
pub struct FeatureNode {
    pub parent: FeatureId,
    pub confidence: Real,
    pub observation_count: u32,
    pub positive: bool,
    pub last_touched: Timestamp,
    pub refcount: u32,
    pub children: SmallVec<[FeatureId; 4]>,
    pub data: NodeData,
}

impl FeatureNode {
    fn root_child(parent: FeatureId, data: NodeData, now: Timestamp) -> Self {
        Self {
            parent,
            confidence: 0.0,
            observation_count: 0,
            positive: true,
            last_touched: now,
            refcount: 0,
            children: SmallVec::new(),
            data,
        }
    }
}

/// Arena of feature nodes for one cell's depth tree *or* obstacle tree (a cell owns two of
/// these, one per kind — see [`crate::map::cell::Cell`]).
#[derive(Debug, Clone, Default)]
pub struct FeatureTree {
    nodes: FastMap<FeatureId, FeatureNode>,
}

impl FeatureTree {
    pub fn new() -> Self {
        Self {
            nodes: new_fast_map(),
        }
    }

    /// A node is live if it is the sentinel root, or still present in the arena.
    pub fn is_live(&self, id: FeatureId) -> bool {
        id.is_root() || self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: FeatureId) -> Option<&FeatureNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: FeatureId) -> Option<&mut FeatureNode> {
        self.nodes.get_mut(&id)
    }

    /// Allocates a brand-new node as a child of `parent` (root if `parent` is the sentinel),
    /// under the supplied freshly-minted `id`.
    pub fn allocate(&mut self, id: FeatureId, parent: FeatureId, data: NodeData, now: Timestamp) {
        debug_assert!(!self.nodes.contains_key(&id), "feature ids must never be reused");
        self.nodes.insert(id, FeatureNode::root_child(parent, data, now));
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(id);
        }
    }

    /// Sweeps the tree, pruning nodes whose confidence or observation count has fallen below
    /// threshold, with zero refcount and no live children. Runs to a fixpoint so that pruning
    /// a leaf can make its now-childless, zero-refcount parent prunable in the same call
    /// ("dereferences the parent transitively", spec.md 4.C.5).
    pub fn reduce(&mut self, conf_threshold: Real, count_threshold: u32) {
        loop {
            let prune_ids: Vec<FeatureId> = self
                .nodes
                .iter()
                .filter(|(_, node)| {
                    (node.confidence < conf_threshold || node.observation_count < count_threshold)
                        && node.refcount == 0
                        && node.children.is_empty()
                })
                .map(|(id, _)| *id)
                .collect();

            if prune_ids.is_empty() {
                break;
            }

            for id in prune_ids {
                if let Some(node) = self.nodes.remove(&id) {
                    if let Some(parent) = self.nodes.get_mut(&node.parent) {
                        parent.children.retain(|c| *c != id);
                    }
                }
            }
        }
    }

    /// Increments the refcount of `id` and every ancestor up to (but not including) the root.
    /// Used when a particle association is created or cloned under resampling.
    pub fn bump_refcount(&mut self, id: FeatureId) {
        let mut cur = id;
        while !cur.is_root() {
            let Some(node) = self.nodes.get_mut(&cur) else {
                break;
            };
            node.refcount += 1;
            cur = node.parent;
        }
    }

    /// Decrements the refcount of `id` and every ancestor up to (but not including) the root.
    /// Used when a particle drops an association (resampled out, or the cell's feature was
    /// pruned out from under it).
    pub fn drop_refcount(&mut self, id: FeatureId) {
        let mut cur = id;
        while !cur.is_root() {
            let Some(node) = self.nodes.get_mut(&cur) else {
                break;
            };
            node.refcount = node.refcount.saturating_sub(1);
            cur = node.parent;
        }
    }

    #[cfg(test)]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
