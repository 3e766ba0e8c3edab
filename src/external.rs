//! Collaborators this crate consumes but does not implement (spec.md §6).
//!
//! Keeping these as traits passed explicitly into every call, rather than as a process-global
//! the map reaches for internally, is one of the design notes in spec.md §9 ("cyclic ownership
//! avoidance") — it also means tests can supply trivial fakes instead of a real polyhedral
//! world model.

use nalgebra::Vector3;

use crate::numeric_types::Real;

/// The static polyhedral environment model (walls, pipelines, etc). Not produced by this
/// crate; consumed via these two queries only.
pub trait StaticNodeMap {
    /// Whether `p` is still within the modeled world.
    fn belongs_to_world(&self, p: Vector3<Real>) -> bool;

    /// Nearest distance from `query` to the named node (e.g. `"root.wall"`), along with the
    /// world-space hit point, as seen from `origin`. Returns `None` if the tag is unknown or
    /// the query point is degenerate.
    fn nearest_distance(
        &self,
        tag: &str,
        query: Vector3<Real>,
        origin: Vector3<Real>,
    ) -> Option<(Real, Vector3<Real>)>;
}

/// A node map with no walls at all: `belongs_to_world` is always true and every distance
/// query comes back empty. Useful for mapping-only deployments and as a test fixture.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenWaterMap;

impl StaticNodeMap for OpenWaterMap {
    fn belongs_to_world(&self, _p: Vector3<Real>) -> bool {
        true
    }

    fn nearest_distance(
        &self,
        _tag: &str,
        _query: Vector3<Real>,
        _origin: Vector3<Real>,
    ) -> Option<(Real, Vector3<Real>)> {
        None
    }
}

/// Control input to the vehicle dynamic model: 12-dimensional state is [position, velocity,
/// orientation, angular velocity] in the source; this crate only needs the velocity and
/// covariance terms the particle filter actually consumes (spec.md §1 treats the rest as a
/// black box).
#[derive(Debug, Clone, Copy)]
pub struct MotionControl {
    pub time: Real,
    pub velocity: Vector3<Real>,
    pub velocity_covariance: nalgebra::Matrix3<Real>,
}

/// 12-dimensional vehicle state: [velocity, angular velocity, position, orientation], matching
/// the layout the original source's dynamic model transitions over.
pub type Vector12 = nalgebra::SVector<Real, 12>;

/// A black-box vehicle dynamic model (thruster/force integration), out of scope here per
/// spec.md §1 — consumed only as a transition function.
pub trait VehicleDynamics {
    /// Advances a 12-dimensional state vector by `dt` seconds under `controls`.
    fn transition(&self, state: Vector12, dt: Real, controls: &MotionControl) -> Vector12;
}

/// Monotonic clock with sub-millisecond resolution, supplied by the transport layer.
pub trait Clock {
    fn now(&self) -> Real;
}

/// One sonar feature return: range in millimeters (matching the wire format produced by the
/// sonar feature extractor) and a detector confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SonarFeature {
    pub range_mm: Real,
    pub confidence: Real,
}

impl SonarFeature {
    pub fn range_m(&self) -> Real {
        self.range_mm / 1000.0
    }
}

/// One ping from the sonar feature extractor: an absolute beam angle (relative to the vehicle
/// frame) plus zero or more detected features along that beam.
#[derive(Debug, Clone)]
pub struct SonarSweep {
    pub angle: Real,
    pub features: Vec<SonarFeature>,
}
