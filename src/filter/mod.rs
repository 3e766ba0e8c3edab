//! The particle filter control loop (spec.md §4.E): state, propagation, weighting,
//! normalization, effective sample size, resampling, interspersal, and the angular-coverage
//! bookkeeping that drives periodic map pruning.

pub mod particle;
pub mod resample;

use log::{debug, trace, warn};
use nalgebra::{Matrix3, Rotation3, Vector3};
use rand::Rng;

use crate::config::FilterConfig;
use crate::error::{Diagnostic, EngineError};
use crate::external::MotionControl;
use crate::map::DpMap;
use crate::numeric_types::Real;
use crate::random::{gaussian_1d, multivariate_gaussian_3d, uniform_box};
use crate::workspace::FilterWorkspace;

pub use particle::PoseParticle;

/// Outcome of a weighting step, surfaced to the engine facade so it can decide whether to
/// flag the step `measurement_incomplete` (spec.md §4.E.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightOutcome {
    Normal,
    MeasurementIncomplete,
}

/// Ordered particle set plus the bookkeeping the control loop needs between steps
/// (spec.md §4.E.1).
#[derive(Debug)]
pub struct ParticleFilter {
    particles: Vec<PoseParticle>,
    generation: u64,
    /// Angular-coverage accumulator for the `reduceFeatures` trigger (spec.md §4.E.4).
    last_beam_angle: Option<Real>,
    angle_sum: Real,
}

impl ParticleFilter {
    /// `initialize` (spec.md §4.E.1/lifecycle): draws `config.particle_number` particles
    /// uniformly from the box around `config.init_position` with half-widths
    /// `config.init_variance`, all with equal weight `1/N`.
    pub fn initialize<R: Rng + ?Sized>(config: &FilterConfig, rng: &mut R) -> Self {
        let center = Vector3::new(
            config.init_position[0],
            config.init_position[1],
            config.init_position[2],
        );
        let width = Vector3::new(
            config.init_variance[0] * 2.0,
            config.init_variance[1] * 2.0,
            config.init_variance[2] * 2.0,
        );
        let weight = 1.0 / (config.particle_number as Real);
        let particles = (0..config.particle_number)
            .map(|_| PoseParticle::new(uniform_box(rng, center, width), weight))
            .collect();
        debug!("initialized {} particles around {:?}", config.particle_number, center);
        Self {
            particles,
            generation: 0,
            last_beam_angle: None,
            angle_sum: 0.0,
        }
    }

    pub fn particles(&self) -> &[PoseParticle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [PoseParticle] {
        &mut self.particles
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `dynamic(particle, control)` (spec.md §4.E.2), applied to every particle.
    ///
    /// `depth_sample` overwrites `z` directly (depth is observed, not dead-reckoned).
    /// `yaw` supplies the world-from-body rotation used to rotate the averaged velocity into
    /// the world frame; this engine treats roll/pitch as zero for the horizontal map (spec.md
    /// Non-goals: no 3D mapping).
    pub fn propagate<R: Rng + ?Sized>(
        &mut self,
        config: &FilterConfig,
        control: &MotionControl,
        yaw: Real,
        depth_sample: Real,
        rng: &mut R,
    ) {
        if self.try_propagate_parallel(config, control, yaw, depth_sample) {
            return;
        }

        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), yaw + config.yaw_offset);
        for particle in &mut self.particles {
            let Some(dt) = next_dt(particle, control) else {
                continue;
            };
            propagate_one(particle, config, control, rotation, dt, depth_sample, rng);
        }
        self.generation += 1;
        trace!("generation {} propagated by dt-from-control", self.generation);
    }

    /// Data-parallel counterpart of [`Self::propagate`] used when `config.parallel` is set
    /// (requires the `parallel` feature). Each particle draws its own motion noise from a
    /// thread-local RNG via `rayon`'s work-stealing pool, following the same
    /// data-parallel-over-an-owned-slice pattern `splashsurf_lib` uses its thread pool for.
    /// Returns whether the parallel path ran; the `parallel`-feature-off build always returns
    /// `false` so [`Self::propagate`] falls through to the sequential path unconditionally.
    #[cfg(feature = "parallel")]
    fn try_propagate_parallel(&mut self, config: &FilterConfig, control: &MotionControl, yaw: Real, depth_sample: Real) -> bool {
        use rayon::prelude::*;

        if !config.parallel {
            return false;
        }

        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), yaw + config.yaw_offset);
        self.particles.par_iter_mut().for_each(|particle| {
            let Some(dt) = next_dt(particle, control) else {
                return;
            };
            let mut rng = rand::thread_rng();
            propagate_one(particle, config, control, rotation, dt, depth_sample, &mut rng);
        });
        self.generation += 1;
        trace!("generation {} propagated in parallel over {} particles", self.generation, self.particles.len());
        true
    }

    #[cfg(not(feature = "parallel"))]
    fn try_propagate_parallel(&mut self, _config: &FilterConfig, _control: &MotionControl, _yaw: Real, _depth_sample: Real) -> bool {
        false
    }

    /// `w_i <- w_i * (importance * likelihood_i + (1 - importance))` (spec.md §4.E.3), applied
    /// to a single particle. `importance = 1.0` recovers the literal spec formula; values below
    /// 1 soften a noisy modality's influence on the weight without this module needing to know
    /// which modality called it.
    pub fn apply_likelihood(&mut self, index: usize, likelihood: Real, importance: Real) {
        if let Some(particle) = self.particles.get_mut(index) {
            particle.weight *= importance * likelihood + (1.0 - importance);
        }
    }

    /// Normalizes weights to sum to 1 and returns `(ess, zero_weight_count)`. Diagnostics are
    /// pushed for a fully degenerate filter (spec.md §7 `DegenerateFilter`) rather than
    /// returned, matching the "never throws across step()" contract.
    pub fn normalize(&mut self, workspace: &mut FilterWorkspace, diagnostics: &mut Vec<Diagnostic>) -> (Real, usize) {
        workspace.clear();
        let total: Real = self.particles.iter().map(|p| p.weight).sum();

        if total <= 0.0 {
            warn!("particle filter weights collapsed to zero; preserving previous weights");
            diagnostics.push(Diagnostic::new(EngineError::DegenerateFilter));
            let n = self.particles.len().max(1);
            let uniform = 1.0 / (n as Real);
            for p in &mut self.particles {
                p.weight = uniform;
            }
            return (n as Real, 0);
        }

        let mut zero_weight_count = 0usize;
        let mut sum_sq = 0.0;
        for p in &mut self.particles {
            p.weight /= total;
            if p.weight == 0.0 {
                zero_weight_count += 1;
            }
            sum_sq += p.weight * p.weight;
            workspace.weights.push(p.weight);
        }

        let ess = if sum_sq > 0.0 { 1.0 / sum_sq } else { 0.0 };
        (ess, zero_weight_count)
    }

    /// Whether ESS has fallen far enough below `ess_threshold * N` to trigger resampling
    /// (spec.md §4.E.3).
    pub fn should_resample(&self, config: &FilterConfig, ess: Real) -> bool {
        ess < config.ess_threshold * (self.particles.len() as Real)
    }

    /// `reduceFeatures` trigger bookkeeping (spec.md §4.E.4): tracks the cumulative absolute
    /// difference of successive beam angles, reduced modulo π (see SPEC_FULL.md §4.E / Open
    /// Question (a)). Returns `true` exactly when the running sum crosses `max_sum` and the
    /// sum has just been reset; the caller is responsible for invoking
    /// [`crate::map::DpMap::reduce_features`] when this returns `true`.
    pub fn note_beam_angle(&mut self, angle: Real, max_sum: Real) -> bool {
        let Some(last) = self.last_beam_angle else {
            self.last_beam_angle = Some(angle);
            return false;
        };

        let mut diff = (angle - last).abs();
        while diff > std::f64::consts::PI {
            diff -= std::f64::consts::PI;
        }
        // The loop invariant already guarantees `0 <= diff <= PI`; this second `abs()` mirrors
        // the defensive (and here, provably redundant) call in the original source rather than
        // silently dropping it — see SPEC_FULL.md Open Question (a).
        diff = diff.abs();

        self.last_beam_angle = Some(angle);
        self.angle_sum += diff;

        if self.angle_sum > max_sum {
            debug!("angular coverage {:.3} exceeded max_sum {:.3}, triggering reduceFeatures", self.angle_sum, max_sum);
            self.angle_sum = 0.0;
            true
        } else {
            false
        }
    }

    /// Systematic resampling (spec.md §4.E.5). Deep-copies the pose/association tables of
    /// each drawn parent into a fresh particle set. Every old particle's associations are
    /// dropped from `map` up front, survivors and casualties alike, and every child clone's
    /// associations are bumped back in as it is created, so a lineage that produces `k`
    /// children ends up referenced exactly `k` times rather than `k + 1`.
    /// Skipped entirely (returns `false`) when `zero_weight_count` exceeds
    /// `config.zero_weight_particle_threshold` (spec.md §4.E.7).
    pub fn maybe_resample<R: Rng + ?Sized>(
        &mut self,
        config: &FilterConfig,
        map: &mut DpMap,
        workspace: &mut FilterWorkspace,
        ess: Real,
        zero_weight_count: usize,
        rng: &mut R,
    ) -> WeightOutcome {
        if zero_weight_count > config.zero_weight_particle_threshold {
            warn!(
                "{} particles hit zero weight (threshold {}), skipping resample this step",
                zero_weight_count, config.zero_weight_particle_threshold
            );
            return WeightOutcome::MeasurementIncomplete;
        }

        if !self.should_resample(config, ess) {
            return WeightOutcome::Normal;
        }

        let draws = resample::systematic_resample(&workspace.weights, rng);
        workspace.draws.clone_from(&draws);

        // Every old particle's associations are dropped, survivors and casualties alike: a
        // surviving parent's refcount contribution is retired here and re-established below by
        // `bump_associations` on each of its clones, so a lineage that produces `k` children ends
        // up referenced exactly `k` times, not `k + 1`.
        for particle in &self.particles {
            drop_associations(particle, map);
        }

        let uniform_weight = 1.0 / (draws.len().max(1) as Real);
        let mut new_particles = Vec::with_capacity(draws.len());
        for &parent_index in &draws {
            let mut child = self.particles[parent_index].deep_clone();
            bump_associations(&child, map);
            child.weight = uniform_weight;
            new_particles.push(child);
        }

        debug!("resampled {} particles at ESS {:.2}", new_particles.len(), ess);
        self.particles = new_particles;
        WeightOutcome::Normal
    }

    /// Interspersal (spec.md §4.E.6): keeps the top `floor((1-r) * N)` particles by weight and
    /// replaces the remainder with draws from `N(mean, cov)`, velocity copied from the best
    /// particle, weight `best.weight - eps`. Renormalizes afterward.
    pub fn intersperse<R: Rng + ?Sized>(
        &mut self,
        mean: Vector3<Real>,
        cov: Matrix3<Real>,
        ratio: Real,
        map: &mut DpMap,
        rng: &mut R,
    ) {
        if self.particles.is_empty() {
            return;
        }
        let n = self.particles.len();
        let keep = ((1.0 - ratio) * (n as Real)).floor().max(0.0) as usize;
        let keep = keep.min(n);

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            self.particles[b]
                .weight
                .partial_cmp(&self.particles[a].weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let best_index = order[0];
        let best_weight = self.particles[best_index].weight;
        let best_velocity = self.particles[best_index].velocity;
        let best_timestamp = self.particles[best_index].timestamp;
        const EPS: Real = 1e-9;

        let mut new_particles = Vec::with_capacity(n);
        for &idx in order.iter().take(keep) {
            new_particles.push(self.particles[idx].clone());
        }
        for &idx in order.iter().skip(keep) {
            drop_associations(&self.particles[idx], map);
            let mut replacement = PoseParticle::new(
                multivariate_gaussian_3d(rng, mean, cov),
                (best_weight - EPS).max(0.0),
            );
            replacement.velocity = best_velocity;
            replacement.timestamp = best_timestamp;
            new_particles.push(replacement);
        }

        let total: Real = new_particles.iter().map(|p| p.weight).sum();
        if total > 0.0 {
            for p in &mut new_particles {
                p.weight /= total;
            }
        }

        debug!("interspersed {} of {} particles with ratio {:.2}", n - keep, n, ratio);
        self.particles = new_particles;
    }

    /// Independent per-particle depth noise draw used by callers that want a noisy
    /// `depth_sample` rather than a direct echosounder reading. Exposed mainly for tests and
    /// for depth-only deployments (`Non-goal`: the production path passes the sensor's own
    /// reading straight into `propagate`).
    pub fn sample_depth_noise<R: Rng + ?Sized>(rng: &mut R, mean: Real, variance: Real) -> Real {
        gaussian_1d(rng, mean, variance)
    }
}

/// `Delta t` since the particle's last update, or `None` on the first call (spec.md §4.E.2:
/// "skipped if timestamp is null"), which also seeds the timestamp as a side effect.
fn next_dt(particle: &mut PoseParticle, control: &MotionControl) -> Option<Real> {
    match particle.timestamp {
        None => {
            particle.timestamp = Some(control.time);
            None
        }
        Some(prev) => Some((control.time - prev).max(0.0)),
    }
}

/// The per-particle body of `dynamic(particle, control)` (spec.md §4.E.2), shared by the
/// sequential and `rayon`-parallel propagation paths.
fn propagate_one<R: Rng + ?Sized>(
    particle: &mut PoseParticle,
    config: &FilterConfig,
    control: &MotionControl,
    rotation: Rotation3<Real>,
    dt: Real,
    depth_sample: Real,
    rng: &mut R,
) {
    let noise = if config.pure_random_motion {
        Vector3::zeros()
    } else if config.use_static_motion_covariance {
        multivariate_gaussian_3d(rng, Vector3::zeros(), config.static_motion_covariance.clone().into_matrix())
    } else {
        multivariate_gaussian_3d(rng, Vector3::zeros(), control.velocity_covariance)
    };
    let noisy_velocity = if config.pure_random_motion { noise } else { control.velocity + noise };

    let mean_velocity = (particle.velocity + noisy_velocity) * 0.5;
    particle.position += rotation * mean_velocity * dt;
    particle.position.z = depth_sample;
    particle.velocity = noisy_velocity;
    particle.timestamp = Some(control.time);
}

fn bump_associations(particle: &PoseParticle, map: &mut DpMap) {
    for (&key, assoc) in particle.depth_cells.iter() {
        map.bump_depth_refcount(key, assoc.id);
    }
    for (&key, assoc) in particle.obstacle_cells.iter() {
        map.bump_obstacle_refcount(key, assoc.id);
    }
}

fn drop_associations(particle: &PoseParticle, map: &mut DpMap) {
    for (&key, assoc) in particle.depth_cells.iter() {
        map.drop_depth_refcount(key, assoc.id);
    }
    for (&key, assoc) in particle.obstacle_cells.iter() {
        map.drop_obstacle_refcount(key, assoc.id);
    }
}

/// Wall-clock-free timestamp helper used by tests that need a monotone `Timestamp` sequence
/// without depending on [`crate::external::Clock`].
#[cfg(test)]
pub(crate) fn fixed_timestamps(
    start: crate::numeric_types::Timestamp,
    step: crate::numeric_types::Timestamp,
) -> impl Iterator<Item = crate::numeric_types::Timestamp> {
    std::iter::successors(Some(start), move |t| Some(t + step))
}
