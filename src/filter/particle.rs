//! The pose particle and its per-particle map association tables.

use nalgebra::Vector3;

use crate::map::CellAssociation;
use crate::map::CellKey;
use crate::new_fast_map;
use crate::numeric_types::{Real, Timestamp};
use crate::FastMap;

/// One weighted pose hypothesis, carrying its own view of which map cells it has observed
/// (spec.md §3).
#[derive(Debug, Clone)]
pub struct PoseParticle {
    pub position: Vector3<Real>,
    pub velocity: Vector3<Real>,
    /// `None` until the first `dynamic()` call sets it (spec.md §4.E.2/§8: "first dynamic call
    /// with a null timestamp leaves position unchanged and only seeds timestamp").
    pub timestamp: Option<Timestamp>,
    pub weight: Real,
    pub depth_cells: FastMap<CellKey, CellAssociation>,
    pub obstacle_cells: FastMap<CellKey, CellAssociation>,
}

impl PoseParticle {
    pub fn new(position: Vector3<Real>, weight: Real) -> Self {
        Self {
            position,
            velocity: Vector3::zeros(),
            timestamp: None,
            weight,
            depth_cells: new_fast_map(),
            obstacle_cells: new_fast_map(),
        }
    }

    /// Deep-copies everything including the association tables, for use by resampling —
    /// refcount bumping on the referenced feature nodes is the caller's responsibility (see
    /// [`crate::filter::resample::systematic_resample`]).
    pub fn deep_clone(&self) -> Self {
        self.clone()
    }
}
