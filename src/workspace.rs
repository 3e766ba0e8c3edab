//! Reusable scratch buffers for the per-step particle loops.
//!
//! Modeled on `splashsurf_lib::workspace::ReconstructionWorkspace`: rather than allocate
//! fresh `Vec`s inside `normalize`/`resample`/`weight` on every call, the engine owns one
//! [`FilterWorkspace`] and each step borrows its buffers, clearing and refilling them in
//! place. The teacher's version additionally wraps its per-thread scratch in a
//! `thread_local::ThreadLocal` because reconstructions may run on a rayon pool; this engine's
//! control loop is single-threaded cooperative (spec.md §5) so a single owned struct on
//! [`crate::engine::Engine`] is enough — no thread-local indirection to reuse allocations
//! across calls made from different threads.

use crate::numeric_types::Real;

/// Scratch space reused across [`crate::engine::Engine`] step calls.
#[derive(Debug, Default)]
pub(crate) struct FilterWorkspace {
    /// Per-particle weights, refilled every `normalize()` call.
    pub weights: Vec<Real>,
    /// Indices drawn by systematic resampling, one per output particle.
    pub draws: Vec<usize>,
}

impl FilterWorkspace {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            weights: Vec::with_capacity(capacity),
            draws: Vec::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.weights.clear();
        self.draws.clear();
    }
}
