//! Filter and map configuration.
//!
//! Plain serde-derived configuration, in the style of `lisal`'s `aqs_utils::config`: the engine
//! does not load this itself (transport/config plumbing is out of scope, see spec §1), callers
//! deserialize a [`FilterConfig`] from whatever format their surrounding application uses and
//! pass it to [`crate::engine::Engine::init`].

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::numeric_types::Real;

/// A 3x3 covariance matrix stored row-major, used where a full `nalgebra::Matrix3` is
/// overkill for a config file but call sites want the maths type back (see [`Matrix3Config::into_matrix`]).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Matrix3Config(pub [[Real; 3]; 3]);

impl Matrix3Config {
    pub fn into_matrix(self) -> nalgebra::Matrix3<Real> {
        nalgebra::Matrix3::from_row_slice(&[
            self.0[0][0],
            self.0[0][1],
            self.0[0][2],
            self.0[1][0],
            self.0[1][1],
            self.0[1][2],
            self.0[2][0],
            self.0[2][1],
            self.0[2][2],
        ])
    }
}

/// An affine 3D transform stored as translation + row-major rotation, used for
/// `sonar_to_vehicle_transform`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AffineConfig {
    pub translation: [Real; 3],
    pub rotation: [[Real; 3]; 3],
}

impl AffineConfig {
    /// Identity transform (no sonar offset from the vehicle frame).
    pub fn identity() -> Self {
        Self {
            translation: [0.0, 0.0, 0.0],
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    pub fn translation_vector(&self) -> nalgebra::Vector3<Real> {
        nalgebra::Vector3::new(self.translation[0], self.translation[1], self.translation[2])
    }

    pub fn rotation_matrix(&self) -> nalgebra::Matrix3<Real> {
        Matrix3Config(self.rotation).into_matrix()
    }
}

/// Full configuration for an [`Engine`](crate::engine::Engine), mirroring the enumeration in
/// spec §6 one-to-one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Number of particles maintained by the filter.
    pub particle_number: usize,
    /// Initial position estimate used by `initialize`.
    pub init_position: [Real; 3],
    /// Half-width of the uniform initialization box around `init_position`, per axis.
    pub init_variance: [Real; 3],

    /// Static motion noise covariance, used instead of per-control covariance when
    /// [`Self::use_static_motion_covariance`] is set.
    pub static_motion_covariance: Matrix3Config,
    /// Whether to always sample motion noise from `static_motion_covariance` rather than
    /// from the covariance carried by each motion control input.
    pub use_static_motion_covariance: bool,
    /// Whether to ignore the control's velocity entirely and integrate pure noise.
    pub pure_random_motion: bool,

    /// Fixed yaw offset applied when composing the vehicle orientation (radians).
    pub yaw_offset: Real,

    /// Sonar/laser validity range, minimum (m).
    pub sonar_minimum_distance: Real,
    /// Sonar/laser validity range, maximum (m).
    pub sonar_maximum_distance: Real,
    /// Full vertical opening angle of the sonar beam (radians).
    pub sonar_vertical_angle: Real,
    /// Variance of the Gaussian sonar/laser likelihood (m^2).
    pub sonar_covariance: Real,

    /// Variance of the echosounder depth likelihood fusion (m^2).
    pub echosounder_variance: Real,

    /// Minimum range considered for sonar feature observation (m).
    pub feature_observation_minimum_range: Real,
    /// Maximum range considered for sonar feature observation (m).
    pub feature_observation_range: Real,
    /// Confidence step applied to a positive obstacle/depth observation.
    pub feature_confidence: Real,
    /// Confidence step subtracted for an empty-cell (`present=false`) observation.
    pub feature_empty_cell_confidence: Real,
    /// Confidence threshold below which a feature node becomes eligible for pruning.
    pub feature_confidence_threshold: Real,
    /// Observation-count threshold below which a feature node becomes eligible for pruning.
    pub feature_observation_count_threshold: u32,
    /// Minimum confidence for a feature to be emitted by `get_cloud`/`get_simple_grid`.
    pub feature_output_confidence_threshold: Real,

    /// Affine transform from the sonar frame to the vehicle frame.
    pub sonar_to_vehicle_transform: AffineConfig,

    /// Fraction of the particle count below which effective sample size triggers resampling.
    pub ess_threshold: Real,

    /// Fraction of particles replaced by an interspersal pose hint.
    pub hough_interspersal_ratio: Real,

    /// When set, `observe` for sonar sweeps only updates the map and returns a neutral
    /// likelihood rather than rating particles against the map.
    pub use_mapping_only: bool,

    /// Consistency gate `k` (in standard deviations) used by `setDepth` to decide whether a
    /// new observation extends or branches the existing node. Left implicit in the original
    /// source (spec.md Open Question (c)); made an explicit, documented parameter here.
    pub depth_consistency_k: Real,

    /// Number of particles with exactly zero weight after a perception update above which
    /// the step is flagged `measurement_incomplete` and resampling is skipped.
    pub zero_weight_particle_threshold: usize,

    /// Angular sum (radians) accumulated between successive sonar beams before
    /// `reduce_features` fires. Defaults to pi.
    pub feature_reduction_max_angle_sum: Real,

    /// Whether per-particle propagation/weighting may run on a rayon thread pool. Requires
    /// the `parallel` feature; ignored otherwise.
    pub parallel: bool,
}

impl FilterConfig {
    /// Validates invariants that must hold before the map/particle set can be created.
    /// The only fatal error kind (spec §7): a non-positive particle count or non-positive
    /// map resolution.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.particle_number == 0 {
            return Err(EngineError::ConfigInvalid(
                "particle_number must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ess_threshold) || self.ess_threshold <= 0.0 {
            return Err(EngineError::ConfigInvalid(
                "ess_threshold must be in (0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.hough_interspersal_ratio) {
            return Err(EngineError::ConfigInvalid(
                "hough_interspersal_ratio must be in [0, 1]".to_string(),
            ));
        }
        if self.sonar_maximum_distance <= self.sonar_minimum_distance {
            return Err(EngineError::ConfigInvalid(
                "sonar_maximum_distance must exceed sonar_minimum_distance".to_string(),
            ));
        }
        if self.depth_consistency_k <= 0.0 {
            return Err(EngineError::ConfigInvalid(
                "depth_consistency_k must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for FilterConfig {
    /// Reasonable defaults for a small coastal-survey vehicle; production deployments are
    /// expected to override every field from their own config file.
    fn default() -> Self {
        Self {
            particle_number: 200,
            init_position: [0.0, 0.0, 0.0],
            init_variance: [1.0, 1.0, 0.2],
            static_motion_covariance: Matrix3Config([
                [0.01, 0.0, 0.0],
                [0.0, 0.01, 0.0],
                [0.0, 0.0, 0.001],
            ]),
            use_static_motion_covariance: true,
            pure_random_motion: false,
            yaw_offset: 0.0,
            sonar_minimum_distance: 0.1,
            sonar_maximum_distance: 30.0,
            sonar_vertical_angle: 0.5,
            sonar_covariance: 0.05,
            echosounder_variance: 0.02,
            feature_observation_minimum_range: 0.2,
            feature_observation_range: 15.0,
            feature_confidence: 0.2,
            feature_empty_cell_confidence: 0.1,
            feature_confidence_threshold: 0.3,
            feature_observation_count_threshold: 3,
            feature_output_confidence_threshold: 0.5,
            sonar_to_vehicle_transform: AffineConfig::identity(),
            ess_threshold: 0.5,
            hough_interspersal_ratio: 0.0,
            use_mapping_only: false,
            depth_consistency_k: 3.0,
            zero_weight_particle_threshold: usize::MAX,
            feature_reduction_max_angle_sum: std::f64::consts::PI,
            parallel: false,
        }
    }
}
