//! GPS, depth, pipeline and buoy likelihoods (spec.md §4.D.4): the lightweight modalities
//! that share the plain `Perception` contract rather than mutating the map like the sonar
//! feature sweep or echosounder do.
//!
//! Pipeline and buoy readings are range residuals against a named node in the static map,
//! the same shape as [`super::laser::LaserBeam`] but against a different tag; GPS and depth
//! are direct comparisons against the particle's own pose, with the measurement carrying its
//! own reported variance rather than reading one from [`crate::config::FilterConfig`] (this
//! crate's configuration enumerates exactly the fields in spec.md §6, none of which cover
//! these four modalities — see DESIGN.md).

use nalgebra::{Vector2, Vector3};

use crate::external::StaticNodeMap;
use crate::filter::particle::PoseParticle;
use crate::map::DpMap;
use crate::numeric_types::Real;
use crate::random::gaussian_pdf_1d;

use super::Perception;

/// 2D surface position fix with the sensor's own reported per-axis variance.
#[derive(Debug, Clone, Copy)]
pub struct GpsMeasurement {
    pub position: Vector2<Real>,
    pub variance_x: Real,
    pub variance_y: Real,
}

impl Perception for GpsMeasurement {
    fn likelihood(&self, particle: &PoseParticle, _map: &DpMap, _statics: &dyn StaticNodeMap) -> Real {
        let px = gaussian_pdf_1d(self.position.x, self.variance_x, particle.position.x);
        let py = gaussian_pdf_1d(self.position.y, self.variance_y, particle.position.y);
        px * py
    }
}

/// A direct depth reading (distinct from the echosounder path, which also updates the map —
/// see [`super::echosounder`]); used when a caller wants depth to contribute to particle
/// weight without touching `depth_cells`.
#[derive(Debug, Clone, Copy)]
pub struct DepthMeasurement {
    pub depth: Real,
    pub variance: Real,
}

impl Perception for DepthMeasurement {
    fn likelihood(&self, particle: &PoseParticle, _map: &DpMap, _statics: &dyn StaticNodeMap) -> Real {
        gaussian_pdf_1d(self.depth, self.variance, particle.position.z)
    }
}

/// Range residual against a named pipeline node, rated the same way as a laser beam.
#[derive(Debug, Clone, Copy)]
pub struct PipelineMeasurement {
    pub query_point: Vector3<Real>,
    pub variance: Real,
}

impl Perception for PipelineMeasurement {
    fn likelihood(&self, particle: &PoseParticle, _map: &DpMap, statics: &dyn StaticNodeMap) -> Real {
        if !statics.belongs_to_world(self.query_point) {
            return 0.0;
        }
        match statics.nearest_distance("root.pipeline", self.query_point, particle.position) {
            Some((residual, _hit)) => gaussian_pdf_1d(0.0, self.variance, residual),
            None => 0.0,
        }
    }
}

/// Range residual against a named buoy node, rated the same way as a laser beam.
#[derive(Debug, Clone, Copy)]
pub struct BuoyMeasurement {
    pub query_point: Vector3<Real>,
    pub variance: Real,
}

impl Perception for BuoyMeasurement {
    fn likelihood(&self, particle: &PoseParticle, _map: &DpMap, statics: &dyn StaticNodeMap) -> Real {
        if !statics.belongs_to_world(self.query_point) {
            return 0.0;
        }
        match statics.nearest_distance("root.buoy", self.query_point, particle.position) {
            Some((residual, _hit)) => gaussian_pdf_1d(0.0, self.variance, residual),
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::OpenWaterMap;

    #[test]
    fn gps_likelihood_peaks_at_measured_position() {
        let m = GpsMeasurement {
            position: Vector2::new(5.0, 5.0),
            variance_x: 1.0,
            variance_y: 1.0,
        };
        let at = PoseParticle::new(Vector3::new(5.0, 5.0, 0.0), 1.0);
        let away = PoseParticle::new(Vector3::new(10.0, 10.0, 0.0), 1.0);
        let map = DpMap::new(Vector2::new(5.0, 5.0), Vector2::new(10.0, 10.0), 1.0);
        assert!(m.likelihood(&at, &map, &OpenWaterMap) > m.likelihood(&away, &map, &OpenWaterMap));
    }

    #[test]
    fn depth_likelihood_peaks_at_measured_depth() {
        let m = DepthMeasurement { depth: -10.0, variance: 0.5 };
        let at = PoseParticle::new(Vector3::new(0.0, 0.0, -10.0), 1.0);
        let away = PoseParticle::new(Vector3::new(0.0, 0.0, -2.0), 1.0);
        let map = DpMap::new(Vector2::new(0.0, 0.0), Vector2::new(10.0, 10.0), 1.0);
        assert!(m.likelihood(&at, &map, &OpenWaterMap) > m.likelihood(&away, &map, &OpenWaterMap));
    }
}
