//! Scalar and identifier types used throughout the engine.

/// Scalar type used for all pose, map and measurement arithmetic.
///
/// Unlike [`splashsurf_lib`](https://docs.rs/splashsurf_lib)'s generic `Real`/`Index`
/// pair (needed there because reconstructions are exported at either `f32` or `f64`
/// precision) this engine always runs the control loop at `f64`: poses are integrated
/// over long missions and the extra precision is cheap compared to one sonar ping.
pub type Real = f64;

/// Discrete grid coordinate along one axis.
pub type GridIndex = i64;

/// Monotonically increasing identifier for a node in a cell's feature tree.
///
/// `0` is the sentinel root shared by every cell (see [`crate::map::feature`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FeatureId(pub u64);

impl FeatureId {
    /// The sentinel root identifier; never allocated, always "live".
    pub const ROOT: FeatureId = FeatureId(0);

    /// Whether this id refers to the sentinel root rather than an allocated node.
    pub fn is_root(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A timestamp in seconds since some monotonic epoch, supplied by the [`crate::external::Clock`]
/// collaborator. `None` represents "never set", used to detect the first `dynamic()` call.
pub type Timestamp = f64;
