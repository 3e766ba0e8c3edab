//! A single grid cell: a static depth estimate plus its depth and obstacle feature trees.

use crate::map::feature::FeatureTree;
use crate::numeric_types::Real;

/// One cell of the horizontal occupancy grid.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    /// Ground-truth depth (mean, variance), set once from a high-certainty collaborator via
    /// `setStaticDepth` and subsequently fused with inverse-variance weighting.
    static_depth: Option<(Real, Real)>,
    pub depth_tree: FeatureTree,
    pub obstacle_tree: FeatureTree,
}

impl Cell {
    pub fn static_depth(&self) -> Option<(Real, Real)> {
        self.static_depth
    }

    /// Fuses a new depth/variance observation into the static depth estimate via
    /// inverse-variance weighting; initializes the estimate on the first call.
    pub fn fuse_static_depth(&mut self, depth: Real, variance: Real) {
        self.static_depth = Some(match self.static_depth {
            None => (depth, variance),
            Some((mean, var)) => {
                let new_var = 1.0 / (1.0 / var + 1.0 / variance);
                let new_mean = (mean / var + depth / variance) * new_var;
                (new_mean, new_var)
            }
        });
    }
}
