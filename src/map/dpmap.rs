//! `DpMap`: the shared grid of feature trees, and the operations in spec.md §4.C.

use crate::grid::Grid2d;
use crate::map::cell::Cell;
use crate::map::feature::NodeData;
use crate::map::{CellAssociation, CellKey};
use crate::new_fast_map;
use crate::numeric_types::{FeatureId, GridIndex, Real, Timestamp};
use crate::output::{CloudPoint, SimpleGrid, SimpleGridCell};
use crate::FastMap;

/// The shared physical map: a fixed grid of cells, each with its own depth/obstacle feature
/// trees, plus the single counter that hands out globally unique, strictly increasing feature
/// ids (spec.md §3: "Identifiers are globally monotonically increasing across the map").
#[derive(Debug, Clone)]
pub struct DpMap {
    grid: Grid2d,
    cells: Vec<Cell>,
    next_id: u64,
}

impl DpMap {
    /// Creates the grid once; it is never resized afterwards.
    pub fn new(center: nalgebra::Vector2<Real>, span: nalgebra::Vector2<Real>, resolution: Real) -> Self {
        let grid = Grid2d::new(center, span, resolution);
        let (nx, ny) = grid.dims();
        let cells = vec![Cell::default(); (nx * ny) as usize];
        Self {
            grid,
            cells,
            next_id: 1,
        }
    }

    pub fn grid(&self) -> &Grid2d {
        &self.grid
    }

    fn index_of(&self, ix: GridIndex, iy: GridIndex) -> Option<usize> {
        let (nx, ny) = self.grid.dims();
        if ix < 0 || iy < 0 || ix >= nx || iy >= ny {
            None
        } else {
            Some((ix * ny + iy) as usize)
        }
    }

    fn cell(&self, ix: GridIndex, iy: GridIndex) -> Option<&Cell> {
        self.index_of(ix, iy).map(|i| &self.cells[i])
    }

    fn cell_mut(&mut self, ix: GridIndex, iy: GridIndex) -> Option<&mut Cell> {
        self.index_of(ix, iy).map(move |i| &mut self.cells[i])
    }

    fn alloc_id(&mut self) -> FeatureId {
        let id = FeatureId(self.next_id);
        self.next_id += 1;
        id
    }

    /// `setStaticDepth` (spec.md 4.C.1): records a ground-truth depth with inverse-variance
    /// fusion. Silently ignores out-of-range positions — static depth is a best-effort prior,
    /// not something a caller can react to per-call.
    pub fn set_static_depth(&mut self, x: Real, y: Real, depth: Real, variance: Real) {
        if let Some((ix, iy)) = self.grid.to_grid(x, y) {
            if let Some(cell) = self.cell_mut(ix, iy) {
                cell.fuse_static_depth(depth, variance);
            }
        }
    }

    /// `setDepth` (spec.md 4.C.2).
    ///
    /// Returns `FeatureId(0)` when the cell is out of range, or when `parent_id` was supplied
    /// but no longer names a live node (the caller must drop the association in that case).
    #[allow(clippy::too_many_arguments)]
    pub fn set_depth(
        &mut self,
        ix: GridIndex,
        iy: GridIndex,
        depth: Real,
        variance: Real,
        parent_id: FeatureId,
        consistency_k: Real,
        confidence_step: Real,
        now: Timestamp,
    ) -> FeatureId {
        let Some(cell) = self.cell_mut(ix, iy) else {
            return FeatureId::ROOT;
        };

        if parent_id.is_root() {
            let id = self.alloc_id();
            let cell = self.cell_mut(ix, iy).expect("checked above");
            cell.depth_tree
                .allocate(id, FeatureId::ROOT, NodeData::Depth { mean: depth, variance }, now);
            if let Some(node) = cell.depth_tree.get_mut(id) {
                node.observation_count = 1;
                node.confidence = confidence_step.min(1.0);
            }
            return id;
        }

        if !cell.depth_tree.is_live(parent_id) {
            return FeatureId::ROOT;
        }

        let (existing_mean, existing_var) = match cell.depth_tree.get(parent_id).map(|n| n.data) {
            Some(NodeData::Depth { mean, variance }) => (mean, variance),
            _ => return FeatureId::ROOT,
        };

        let sigma = existing_var.max(0.0).sqrt();
        let consistent = sigma <= 0.0 || (depth - existing_mean).abs() <= consistency_k * sigma;

        if consistent {
            let node = cell.depth_tree.get_mut(parent_id).expect("checked is_live");
            let new_var = 1.0 / (1.0 / existing_var + 1.0 / variance);
            let new_mean = (existing_mean / existing_var + depth / variance) * new_var;
            node.data = NodeData::Depth {
                mean: new_mean,
                variance: new_var,
            };
            node.observation_count += 1;
            node.confidence = (node.confidence + confidence_step).min(1.0);
            node.last_touched = now;
            parent_id
        } else {
            let id = self.alloc_id();
            let cell = self.cell_mut(ix, iy).expect("checked above");
            cell.depth_tree
                .allocate(id, parent_id, NodeData::Depth { mean: depth, variance }, now);
            if let Some(node) = cell.depth_tree.get_mut(id) {
                node.observation_count = 1;
                node.confidence = confidence_step.min(1.0);
            }
            id
        }
    }

    /// `setObstacle` (spec.md 4.C.3).
    #[allow(clippy::too_many_arguments)]
    pub fn set_obstacle(
        &mut self,
        ix: GridIndex,
        iy: GridIndex,
        present: bool,
        confidence_delta: Real,
        zmin: Real,
        zmax: Real,
        parent_id: FeatureId,
        now: Timestamp,
    ) -> FeatureId {
        let Some(cell) = self.cell_mut(ix, iy) else {
            return FeatureId::ROOT;
        };

        if parent_id.is_root() {
            let id = self.alloc_id();
            let cell = self.cell_mut(ix, iy).expect("checked above");
            let span = if present { (zmin, zmax) } else { (0.0, 0.0) };
            cell.obstacle_tree
                .allocate(id, FeatureId::ROOT, NodeData::Obstacle { span }, now);
            if let Some(node) = cell.obstacle_tree.get_mut(id) {
                node.observation_count = 1;
                node.positive = present;
                node.confidence = if present { confidence_delta.clamp(0.0, 1.0) } else { 0.0 };
            }
            return id;
        }

        if !cell.obstacle_tree.is_live(parent_id) {
            return FeatureId::ROOT;
        }

        let node = cell.obstacle_tree.get_mut(parent_id).expect("checked is_live");
        node.observation_count += 1;
        node.last_touched = now;
        if present {
            node.confidence = (node.confidence + confidence_delta).clamp(0.0, 1.0);
            node.positive = true;
            if let NodeData::Obstacle { span: (smin, smax) } = node.data {
                node.data = NodeData::Obstacle {
                    span: (smin.min(zmin), smax.max(zmax)),
                };
            } else {
                node.data = NodeData::Obstacle { span: (zmin, zmax) };
            }
        } else {
            node.confidence = (node.confidence - confidence_delta).clamp(0.0, 1.0);
            if node.confidence <= 0.0 {
                node.positive = false;
            }
        }
        parent_id
    }

    /// `touchObstacleFeature` (spec.md 4.C.4): refreshes `last_touched` without touching
    /// confidence. No-op if the id is no longer live.
    pub fn touch_obstacle_feature(&mut self, ix: GridIndex, iy: GridIndex, id: FeatureId, now: Timestamp) {
        if let Some(cell) = self.cell_mut(ix, iy) {
            if let Some(node) = cell.obstacle_tree.get_mut(id) {
                node.last_touched = now;
            }
        }
    }

    /// `reduceFeatures` (spec.md 4.C.5): sweeps every cell's depth and obstacle trees.
    pub fn reduce_features(&mut self, conf_threshold: Real, count_threshold: u32) {
        for cell in &mut self.cells {
            cell.depth_tree.reduce(conf_threshold, count_threshold);
            cell.obstacle_tree.reduce(conf_threshold, count_threshold);
        }
    }

    /// `getObservedCells` (spec.md 4.C.6): for each input cell, if the particle's obstacle
    /// association points at a live, positive node, emit the cell center with that node's
    /// confidence.
    pub fn get_observed_cells(
        &self,
        cells: &[CellKey],
        particle_obstacle_cells: &FastMap<CellKey, CellAssociation>,
    ) -> Vec<((Real, Real), Real)> {
        let mut out = Vec::new();
        for &(ix, iy) in cells {
            let Some(assoc) = particle_obstacle_cells.get(&(ix, iy)) else {
                continue;
            };
            let Some(cell) = self.cell(ix, iy) else {
                continue;
            };
            if let Some(node) = cell.obstacle_tree.get(assoc.id) {
                if node.positive {
                    out.push((self.grid.to_world(ix, iy), node.confidence));
                }
            }
        }
        out
    }

    /// `getCloud`: projects every confident, sufficiently-observed feature a particle
    /// references (depth and obstacle) into world-space points.
    pub fn get_cloud(
        &self,
        depth_cells: &FastMap<CellKey, CellAssociation>,
        obstacle_cells: &FastMap<CellKey, CellAssociation>,
        conf_threshold: Real,
        count_threshold: u32,
    ) -> Vec<CloudPoint> {
        let mut out = Vec::new();

        for (&(ix, iy), assoc) in depth_cells {
            let Some(cell) = self.cell(ix, iy) else {
                continue;
            };
            let Some(node) = cell.depth_tree.get(assoc.id) else {
                continue;
            };
            if node.confidence >= conf_threshold && node.observation_count >= count_threshold {
                if let NodeData::Depth { mean, .. } = node.data {
                    let (x, y) = self.grid.to_world(ix, iy);
                    out.push(CloudPoint {
                        x,
                        y,
                        z_mean: mean,
                        confidence: node.confidence,
                    });
                }
            }
        }

        for (&(ix, iy), assoc) in obstacle_cells {
            let Some(cell) = self.cell(ix, iy) else {
                continue;
            };
            let Some(node) = cell.obstacle_tree.get(assoc.id) else {
                continue;
            };
            if node.positive && node.confidence >= conf_threshold && node.observation_count >= count_threshold {
                if let NodeData::Obstacle { span } = node.data {
                    let (x, y) = self.grid.to_world(ix, iy);
                    let z_mean = (span.0 + span.1) * 0.5;
                    out.push(CloudPoint {
                        x,
                        y,
                        z_mean,
                        confidence: node.confidence,
                    });
                }
            }
        }

        out
    }

    /// `getSimpleGrid`: dense projection of a particle's observed cells. `out`'s dimensions
    /// must already match the map's `(nx, ny)`.
    pub fn get_simple_grid(
        &self,
        obstacle_cells: &FastMap<CellKey, CellAssociation>,
        conf_threshold: Real,
        count_threshold: u32,
        out: &mut SimpleGrid,
    ) -> usize {
        let mut written = 0;
        for (&(ix, iy), assoc) in obstacle_cells {
            let Some(cell) = self.cell(ix, iy) else {
                continue;
            };
            let Some(node) = cell.obstacle_tree.get(assoc.id) else {
                continue;
            };
            if node.confidence < conf_threshold || node.observation_count < count_threshold {
                continue;
            }
            if let NodeData::Obstacle { span } = node.data {
                out.set(
                    ix as usize,
                    iy as usize,
                    SimpleGridCell {
                        has_feature: node.positive,
                        confidence: node.confidence,
                        zmin: span.0,
                        zmax: span.1,
                    },
                );
                written += 1;
            }
        }
        written
    }

    pub fn new_association_map() -> FastMap<CellKey, CellAssociation> {
        new_fast_map()
    }

    /// Increments the refcount of `id` (and its ancestors) in cell `(ix, iy)`'s depth tree.
    /// Used by resampling when a child particle inherits a parent's association
    /// (spec.md §4.E.5).
    pub fn bump_depth_refcount(&mut self, (ix, iy): CellKey, id: FeatureId) {
        if let Some(cell) = self.cell_mut(ix, iy) {
            cell.depth_tree.bump_refcount(id);
        }
    }

    /// Decrements the refcount of `id` (and its ancestors) in cell `(ix, iy)`'s depth tree.
    /// Used when a particle holding the association is dropped, whether by resampling or
    /// interspersal.
    pub fn drop_depth_refcount(&mut self, (ix, iy): CellKey, id: FeatureId) {
        if let Some(cell) = self.cell_mut(ix, iy) {
            cell.depth_tree.drop_refcount(id);
        }
    }

    /// Obstacle-tree counterpart of [`Self::bump_depth_refcount`].
    pub fn bump_obstacle_refcount(&mut self, (ix, iy): CellKey, id: FeatureId) {
        if let Some(cell) = self.cell_mut(ix, iy) {
            cell.obstacle_tree.bump_refcount(id);
        }
    }

    /// Obstacle-tree counterpart of [`Self::drop_depth_refcount`].
    pub fn drop_obstacle_refcount(&mut self, (ix, iy): CellKey, id: FeatureId) {
        if let Some(cell) = self.cell_mut(ix, iy) {
            cell.obstacle_tree.drop_refcount(id);
        }
    }

    /// Confidence of `id` in cell `(ix, iy)`'s obstacle tree, if it is still live — used by
    /// the sonar rating step to weight a matched cell by how confident the map already is
    /// in it.
    pub fn live_obstacle_confidence(&self, (ix, iy): CellKey, id: FeatureId) -> Option<Real> {
        self.cell(ix, iy)?.obstacle_tree.get(id).map(|n| n.confidence)
    }

    /// Direct read of an obstacle tree node, exposed for callers (and tests) that already
    /// hold an association and want its full node data rather than just the confidence.
    pub fn cell_obstacle_node(&self, (ix, iy): CellKey, id: FeatureId) -> Option<&crate::map::feature::FeatureNode> {
        self.cell(ix, iy)?.obstacle_tree.get(id)
    }

    /// Depth-tree counterpart of [`Self::cell_obstacle_node`].
    pub fn cell_depth_node(&self, (ix, iy): CellKey, id: FeatureId) -> Option<&crate::map::feature::FeatureNode> {
        self.cell(ix, iy)?.depth_tree.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector2;

    fn map() -> DpMap {
        DpMap::new(Vector2::new(5.0, 5.0), Vector2::new(10.0, 10.0), 1.0)
    }

    #[test]
    fn set_depth_allocates_new_root_child() {
        let mut m = map();
        let id = m.set_depth(3, 3, -5.0, 0.1, FeatureId::ROOT, 3.0, 0.2, 0.0);
        assert!(!id.is_root());
    }

    #[test]
    fn set_depth_extends_consistent_observation_same_id() {
        let mut m = map();
        let id = m.set_depth(3, 3, -5.0, 0.1, FeatureId::ROOT, 3.0, 0.2, 0.0);
        let id2 = m.set_depth(3, 3, -5.05, 0.1, id, 3.0, 0.2, 1.0);
        assert_eq!(id, id2);
    }

    #[test]
    fn set_depth_branches_on_inconsistent_observation() {
        let mut m = map();
        let id = m.set_depth(3, 3, -5.0, 0.01, FeatureId::ROOT, 1.0, 0.2, 0.0);
        // 10 meters off is far beyond 1-sigma of a 0.01 variance estimate.
        let id2 = m.set_depth(3, 3, 5.0, 0.01, id, 1.0, 0.2, 1.0);
        assert_ne!(id, id2);
    }

    #[test]
    fn set_depth_out_of_range_returns_root() {
        let mut m = map();
        let id = m.set_depth(1000, 1000, -5.0, 0.1, FeatureId::ROOT, 3.0, 0.2, 0.0);
        assert_eq!(id, FeatureId::ROOT);
    }

    #[test]
    fn set_obstacle_present_then_absent_reduces_confidence() {
        let mut m = map();
        let id = m.set_obstacle(2, 2, true, 0.3, -1.0, 1.0, FeatureId::ROOT, 0.0);
        assert!(!id.is_root());
        let id2 = m.set_obstacle(2, 2, false, 0.1, 0.0, 0.0, id, 1.0);
        assert_eq!(id, id2);
        let node = m.cell(2, 2).unwrap().obstacle_tree.get(id).unwrap();
        assert!((node.confidence - 0.2).abs() < 1e-9);
    }

    #[test]
    fn scenario_two_sonar_feature_weakens_empty_cells() {
        // Scenario 2 from spec.md §8: cell (3,0) gets a positive obstacle, cells (1,0) (2,0)
        // along the ray get weakened as empty.
        let mut m = DpMap::new(Vector2::new(5.0, 5.0), Vector2::new(10.0, 10.0), 1.0);
        let (ix, iy) = m.grid().to_grid(3.5, 0.5).unwrap();
        let id = m.set_obstacle(ix, iy, true, 0.2, -0.1, 0.1, FeatureId::ROOT, 0.0);
        assert!(!id.is_root());

        let (ex, ey) = m.grid().to_grid(1.5, 0.5).unwrap();
        let empty_id = m.set_obstacle(ex, ey, true, 0.2, -0.1, 0.1, FeatureId::ROOT, 0.0);
        let weakened = m.set_obstacle(ex, ey, false, 0.1, 0.0, 0.0, empty_id, 1.0);
        let node = m.cell(ex, ey).unwrap().obstacle_tree.get(weakened).unwrap();
        assert!(node.confidence < 0.2);
    }

    #[test]
    fn reduce_features_removes_unreferenced_stale_node() {
        let mut m = map();
        let id = m.set_obstacle(4, 4, true, 0.1, 0.0, 0.0, FeatureId::ROOT, 0.0);
        // confidence 0.1 < threshold, count 1 < threshold, refcount 0 -> prunable
        m.reduce_features(0.3, 3);
        assert!(!m.cell(4, 4).unwrap().obstacle_tree.is_live(id));
    }
}
