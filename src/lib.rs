//!
//! Rao-Blackwellised particle filter and DP-SLAM map core for underwater vehicle
//! localization. Entry point is [`engine::Engine`].
//!

/// Re-export the version of nalgebra used by this crate
pub use nalgebra;

/// Scalar, index and identifier types shared by every module
pub mod numeric_types;

/// Configuration accepted by [`engine::Engine::init`]
pub mod config;
/// Fatal/non-fatal error and diagnostic types
pub mod error;
/// Collaborators this crate consumes but does not implement (static node map, vehicle
/// dynamics, sonar feature extractor, clock)
pub mod external;
/// The particle filter control loop: propagation, weighting, resampling, ESS, interspersal
pub mod filter;
/// World <-> grid coordinate mapping and ray traversal
pub mod grid;
/// The DP-SLAM map: feature trees, per-cell bookkeeping, pruning
pub mod map;
/// Exported map projections (point clouds, dense grids)
pub mod output;
/// The echosounder/sonar/laser/GPS/depth/pipeline/buoy observation models
pub mod perception;
/// Uniform and multivariate Gaussian sampling, Gaussian pdf
pub mod random;
/// Reusable scratch buffers for the per-step particle loops
pub(crate) mod workspace;

/// The public facade wiring the map and the particle filter together
pub mod engine;

pub use config::FilterConfig;
pub use engine::Engine;
pub use error::{Diagnostic, EngineError};

/// Configures the global `rayon` thread pool used by the data-parallel propagation path
/// (see [`config::FilterConfig::parallel`]), mirroring `splashsurf_lib::initialize_thread_pool`.
///
/// Like its teacher counterpart this only has an effect the first time it is called; `rayon`
/// silently keeps the pool from the first call for the lifetime of the process.
#[cfg(feature = "parallel")]
pub fn initialize_thread_pool(num_threads: usize) -> Result<(), EngineError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .map_err(|e| EngineError::ConfigInvalid(e.to_string()))
}

pub(crate) type HashState = fxhash::FxBuildHasher;
pub(crate) type FastMap<K, V> = std::collections::HashMap<K, V, HashState>;
pub(crate) fn new_fast_map<K, V>() -> FastMap<K, V> {
    FastMap::with_hasher(HashState::default())
}
