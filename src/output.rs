//! Persisted/exported map projections: point clouds and dense grids (spec.md §6).

use crate::numeric_types::Real;

/// One point in a `get_cloud` projection: a confident, sufficiently-observed feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudPoint {
    pub x: Real,
    pub y: Real,
    pub z_mean: Real,
    pub confidence: Real,
}

/// One cell of a `get_simple_grid` projection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimpleGridCell {
    pub has_feature: bool,
    pub confidence: Real,
    pub zmin: Real,
    pub zmax: Real,
}

/// Dense row-major grid of [`SimpleGridCell`], one entry per cell in the particle's observed
/// cell list (not necessarily every cell of the map — see [`crate::map::dpmap::DpMap::get_simple_grid`]).
#[derive(Debug, Clone, Default)]
pub struct SimpleGrid {
    pub width: usize,
    pub height: usize,
    pub cells: Vec<SimpleGridCell>,
}

impl SimpleGrid {
    pub fn with_dims(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![SimpleGridCell::default(); width * height],
        }
    }

    pub fn get(&self, ix: usize, iy: usize) -> Option<&SimpleGridCell> {
        self.cells.get(iy * self.width + ix)
    }

    pub fn set(&mut self, ix: usize, iy: usize, cell: SimpleGridCell) {
        if let Some(slot) = self.cells.get_mut(iy * self.width + ix) {
            *slot = cell;
        }
    }
}
