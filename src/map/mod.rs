//! The DP-SLAM map: a shared grid of cells, each holding per-kind feature trees, plus the
//! operations particles use to read and extend their own view of it.

pub mod cell;
pub mod dpmap;
pub mod feature;

pub use dpmap::DpMap;

use crate::numeric_types::{FeatureId, GridIndex, Real};

/// Key into a particle's association table: a grid cell coordinate.
pub type CellKey = (GridIndex, GridIndex);

/// One particle's pointer into a cell's feature tree: which node (by id) represents this
/// particle's current view of that cell, plus the discretized world position for convenience
/// (mirrors the original source storing `(Eigen::Vector2d, int64_t)` per cell).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellAssociation {
    pub discrete: (Real, Real),
    pub id: FeatureId,
}
