//! Observation models (spec.md §4.D): echosounder, sonar feature sweep, laser/static-node-map
//! ranging, and the lightweight GPS/depth/pipeline/buoy modalities, all expressed as a tagged
//! sum of measurement kinds rather than a class hierarchy (spec.md §9 design note).

pub mod basic;
pub mod echosounder;
pub mod laser;
pub mod sonar;

use crate::external::StaticNodeMap;
use crate::filter::particle::PoseParticle;
use crate::map::DpMap;
use crate::numeric_types::Real;

pub use basic::{BuoyMeasurement, DepthMeasurement, GpsMeasurement, PipelineMeasurement};
pub use laser::LaserBeam;

/// Common contract for the modalities that contribute a pure likelihood without mutating the
/// map (spec.md §4.D.4): `(particle, measurement, map) -> likelihood ∈ [0, ∞)`.
pub trait Perception {
    fn likelihood(
        &self,
        particle: &PoseParticle,
        map: &DpMap,
        statics: &dyn StaticNodeMap,
    ) -> Real;
}

/// A single incoming observation, dispatched by variant rather than by virtual call. Sonar
/// feature sweeps and echosounder depth samples are not included here because they mutate the
/// map and a particle's association tables as part of being processed — they go through
/// [`sonar::observe_sonar_sweep`] and [`echosounder::observe_depth_sample`] directly rather
/// than through this trait.
#[derive(Debug, Clone)]
pub enum Measurement {
    Laser(LaserBeam),
    Gps(GpsMeasurement),
    Depth(DepthMeasurement),
    Pipeline(PipelineMeasurement),
    Buoy(BuoyMeasurement),
}

impl Perception for Measurement {
    fn likelihood(&self, particle: &PoseParticle, map: &DpMap, statics: &dyn StaticNodeMap) -> Real {
        match self {
            Measurement::Laser(beam) => beam.likelihood(particle, map, statics),
            Measurement::Gps(m) => m.likelihood(particle, map, statics),
            Measurement::Depth(m) => m.likelihood(particle, map, statics),
            Measurement::Pipeline(m) => m.likelihood(particle, map, statics),
            Measurement::Buoy(m) => m.likelihood(particle, map, statics),
        }
    }
}
