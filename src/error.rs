//! Error and diagnostic types.
//!
//! Following the contract in the engine's design notes, only [`ConfigInvalid`](EngineError::ConfigInvalid)
//! is fatal and surfaces as a `Result::Err` (from [`crate::engine::Engine::init`]). Every other
//! condition is absorbed inside `observe`/`dynamic` and reported as a [`Diagnostic`] that the
//! caller can drain after each step; the engine never returns an error from `step()` itself.

use thiserror::Error as ThisError;

use crate::numeric_types::{FeatureId, Real};

/// Fatal or non-fatal conditions the engine can encounter.
#[non_exhaustive]
#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum EngineError {
    /// A particle or observation endpoint fell outside the static node map.
    #[error("position outside static world map")]
    OutOfWorld,
    /// A measurement fell outside the sensor's valid range.
    #[error("measurement out of sensor range")]
    OutOfRange,
    /// A particle's cell association pointed at a feature node that has since been pruned.
    #[error("feature {0} is no longer a live association")]
    StaleAssociation(FeatureId),
    /// `sum(weight^2) == 0` after a perception update; resampling was skipped this tick.
    #[error("degenerate particle filter: all weights collapsed to zero")]
    DegenerateFilter,
    /// Fatal: raised only from [`crate::engine::Engine::init`].
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

/// A non-fatal condition recorded during a `step()`, meant for a diagnostics channel rather
/// than for control flow.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// What happened.
    pub error: EngineError,
    /// Particle index this diagnostic pertains to, if any.
    pub particle: Option<usize>,
    /// Scalar context relevant to the diagnostic (e.g. the likelihood substituted for the
    /// rejected measurement).
    pub value: Option<Real>,
}

impl Diagnostic {
    pub(crate) fn new(error: EngineError) -> Self {
        Self {
            error,
            particle: None,
            value: None,
        }
    }

    pub(crate) fn for_particle(mut self, index: usize) -> Self {
        self.particle = Some(index);
        self
    }
}
