//! Laser / single-range sonar against the static polyhedral node map (spec.md §4.D.3).

use nalgebra::Vector3;

use crate::external::StaticNodeMap;
use crate::filter::particle::PoseParticle;
use crate::map::DpMap;
use crate::numeric_types::Real;
use crate::random::gaussian_pdf_1d;

use super::Perception;

/// A single-range beam: world-frame yaw, validity range, and the Gaussian likelihood
/// variance to rate the residual against.
#[derive(Debug, Clone, Copy)]
pub struct LaserBeam {
    pub yaw: Real,
    pub range: Real,
    pub r_min: Real,
    pub r_max: Real,
    pub sonar_covariance: Real,
}

impl LaserBeam {
    /// World-frame endpoint of the beam cast from `particle`'s position.
    fn endpoint(&self, particle: &PoseParticle) -> Vector3<Real> {
        particle.position + Vector3::new(self.range * self.yaw.cos(), self.range * self.yaw.sin(), 0.0)
    }
}

impl Perception for LaserBeam {
    /// Out-of-world endpoint contributes likelihood 0 (spec.md §7 `OutOfWorld`). A range
    /// outside `[r_min, r_max]` is treated as `OutOfRange` and returns a uniform density over
    /// the valid span rather than 0, matching spec.md §7's "uniform likelihood" contract.
    fn likelihood(&self, particle: &PoseParticle, _map: &DpMap, statics: &dyn StaticNodeMap) -> Real {
        if self.range < self.r_min || self.range > self.r_max {
            let span = (self.r_max - self.r_min).max(Real::EPSILON);
            return 1.0 / span;
        }

        let endpoint = self.endpoint(particle);
        if !statics.belongs_to_world(endpoint) {
            return 0.0;
        }

        match statics.nearest_distance("root.wall", endpoint, particle.position) {
            Some((residual, _hit)) => gaussian_pdf_1d(0.0, self.sonar_covariance, residual),
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::OpenWaterMap;
    use std::f64::consts::PI;

    struct WallAt {
        x: Real,
        residual: Real,
    }

    impl StaticNodeMap for WallAt {
        fn belongs_to_world(&self, p: Vector3<Real>) -> bool {
            p.x < self.x
        }

        fn nearest_distance(&self, tag: &str, _query: Vector3<Real>, _origin: Vector3<Real>) -> Option<(Real, Vector3<Real>)> {
            if tag == "root.wall" {
                Some((self.residual, Vector3::new(self.x, 0.0, 0.0)))
            } else {
                None
            }
        }
    }

    #[test]
    fn zero_residual_matches_scenario_six() {
        // End-to-end scenario 6.
        let sigma2 = 0.05;
        let beam = LaserBeam {
            yaw: 0.0,
            range: 4.0,
            r_min: 0.1,
            r_max: 30.0,
            sonar_covariance: sigma2,
        };
        let wall = WallAt { x: 9.0, residual: 0.0 };
        let particle = PoseParticle::new(nalgebra::Vector3::new(5.0, 5.0, 0.0), 1.0);
        let expected = 1.0 / (2.0 * PI * sigma2).sqrt();
        assert!((beam.likelihood(&particle, &crate::map::DpMap::new(nalgebra::Vector2::new(5.0, 5.0), nalgebra::Vector2::new(10.0, 10.0), 1.0), &wall) - expected).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_is_uniform() {
        let beam = LaserBeam {
            yaw: 0.0,
            range: 100.0,
            r_min: 0.1,
            r_max: 30.0,
            sonar_covariance: 0.05,
        };
        let particle = PoseParticle::new(nalgebra::Vector3::new(5.0, 5.0, 0.0), 1.0);
        let map = crate::map::DpMap::new(nalgebra::Vector2::new(5.0, 5.0), nalgebra::Vector2::new(10.0, 10.0), 1.0);
        let lik = beam.likelihood(&particle, &map, &OpenWaterMap);
        assert!((lik - 1.0 / 29.9).abs() < 1e-9);
    }

    #[test]
    fn out_of_world_is_zero() {
        let beam = LaserBeam {
            yaw: 0.0,
            range: 4.0,
            r_min: 0.1,
            r_max: 30.0,
            sonar_covariance: 0.05,
        };
        struct NoWorld;
        impl StaticNodeMap for NoWorld {
            fn belongs_to_world(&self, _p: Vector3<Real>) -> bool {
                false
            }
            fn nearest_distance(&self, _tag: &str, _q: Vector3<Real>, _o: Vector3<Real>) -> Option<(Real, Vector3<Real>)> {
                None
            }
        }
        let particle = PoseParticle::new(nalgebra::Vector3::new(5.0, 5.0, 0.0), 1.0);
        let map = crate::map::DpMap::new(nalgebra::Vector2::new(5.0, 5.0), nalgebra::Vector2::new(10.0, 10.0), 1.0);
        assert_eq!(beam.likelihood(&particle, &map, &NoWorld), 0.0);
    }
}
