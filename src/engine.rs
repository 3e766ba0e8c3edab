//! The public facade wiring the grid, map, particle filter and observation models together
//! (spec.md §4.F).

use log::info;
use nalgebra::{Matrix3, Vector2, Vector3};
use rand::Rng;

use crate::config::FilterConfig;
use crate::error::{Diagnostic, EngineError};
use crate::external::{Clock, MotionControl, OpenWaterMap, SonarSweep, StaticNodeMap};
use crate::filter::{ParticleFilter, PoseParticle, WeightOutcome};
use crate::map::DpMap;
use crate::numeric_types::{Real, Timestamp};
use crate::output::{CloudPoint, SimpleGrid};
use crate::perception::{self, Measurement, Perception};
use crate::workspace::FilterWorkspace;

/// Wires together the DP-SLAM map, the particle filter, and the configured observation
/// models behind the `step()`-style API in spec.md §4.F.
pub struct Engine {
    map: DpMap,
    filter: ParticleFilter,
    config: FilterConfig,
    statics: Option<Box<dyn StaticNodeMap>>,
    diagnostics: Vec<Diagnostic>,
    workspace: FilterWorkspace,
}

impl Engine {
    /// `init(center, span, res, config)`. The only fatal path in this crate (spec.md §7
    /// `ConfigInvalid`).
    pub fn init<R: Rng + ?Sized>(
        center: Vector2<Real>,
        span: Vector2<Real>,
        resolution: Real,
        config: FilterConfig,
        rng: &mut R,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let map = DpMap::new(center, span, resolution);
        let filter = ParticleFilter::initialize(&config, rng);
        let workspace = FilterWorkspace::with_capacity(config.particle_number);
        info!(
            "engine initialized: {} particles over a {}x{} grid at {} m/cell",
            config.particle_number,
            map.grid().dims().0,
            map.grid().dims().1,
            resolution
        );
        Ok(Self {
            map,
            filter,
            config,
            statics: None,
            diagnostics: Vec::new(),
            workspace,
        })
    }

    /// `initializeStatics(nodeMap)`.
    pub fn initialize_statics(&mut self, statics: Box<dyn StaticNodeMap>) {
        info!("static node map attached");
        self.statics = Some(statics);
    }

    fn statics_or_default(&self) -> &dyn StaticNodeMap {
        match &self.statics {
            Some(s) => s.as_ref(),
            None => &OpenWaterMap,
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn map(&self) -> &DpMap {
        &self.map
    }

    pub fn particles(&self) -> &[PoseParticle] {
        self.filter.particles()
    }

    /// Drains and returns every diagnostic recorded since the last call (spec.md §7: the
    /// engine never propagates these as errors from `step()`-style calls).
    pub fn drain_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// `observeDepth(pos, cov, depth)`: a high-certainty ground-truth depth fix, fused
    /// directly into the map's static depth estimate rather than into any particle's
    /// association table (the DP map counterpart of `DPSlam::observeDepth`, distinct from the
    /// per-particle echosounder path below).
    pub fn observe_depth(&mut self, x: Real, y: Real, depth: Real, variance: Real) {
        self.map.set_static_depth(x, y, depth, variance);
    }

    /// `observe(particle, depth)` (spec.md §4.D.1), applied to every particle: each particle
    /// extends or allocates its own depth association at its own `(x, y)` cell. Returns each
    /// particle's weight unchanged, matching the spec contract.
    pub fn observe_echosounder(&mut self, depth: Real, variance: Real, now: Timestamp) {
        let particles = self.filter.particles_mut();
        for (index, particle) in particles.iter_mut().enumerate() {
            perception::echosounder::observe_depth_sample(
                particle,
                &mut self.map,
                depth,
                variance,
                self.config.depth_consistency_k,
                self.config.feature_confidence,
                now,
                &mut self.diagnostics,
                index,
            );
        }
    }

    /// `observe(particle, sonarFeatures, yaw, depth)` (spec.md §4.D.2), applied to every
    /// particle. Runs the angular-coverage `reduceFeatures` bookkeeping once per sweep
    /// (spec.md §4.E.4), then for each particle ray-casts, updates obstacle associations, and
    /// multiplies the rating score into that particle's weight.
    pub fn observe_sonar_sweep(&mut self, sweep: &SonarSweep, vehicle_yaw: Real, now: Timestamp) {
        let abs_angle = perception::sonar::absolute_beam_angle(sweep, vehicle_yaw, self.config.yaw_offset);
        if self
            .filter
            .note_beam_angle(abs_angle, self.config.feature_reduction_max_angle_sum)
        {
            self.map
                .reduce_features(self.config.feature_confidence_threshold, self.config.feature_observation_count_threshold);
        }

        let default_statics = OpenWaterMap;
        let statics_ref: &dyn StaticNodeMap = self.statics.as_deref().unwrap_or(&default_statics);

        if self.config.use_mapping_only {
            // Update the map from every particle's perspective but contribute no likelihood.
            let particles = self.filter.particles_mut();
            for (index, particle) in particles.iter_mut().enumerate() {
                perception::sonar::observe_sonar_sweep(
                    particle,
                    &mut self.map,
                    &self.config,
                    statics_ref,
                    sweep,
                    vehicle_yaw,
                    now,
                    &mut self.diagnostics,
                    index,
                );
            }
            return;
        }

        let mut likelihoods = vec![0.0; self.filter.particles().len()];
        {
            let particles = self.filter.particles_mut();
            for (index, particle) in particles.iter_mut().enumerate() {
                likelihoods[index] = perception::sonar::observe_sonar_sweep(
                    particle,
                    &mut self.map,
                    &self.config,
                    statics_ref,
                    sweep,
                    vehicle_yaw,
                    now,
                    &mut self.diagnostics,
                    index,
                );
            }
        }
        for (index, likelihood) in likelihoods.into_iter().enumerate() {
            self.filter.apply_likelihood(index, likelihood, 1.0);
        }
    }

    /// `rate(particle, …)` (spec.md §4.D.4): the common GPS/depth/pipeline/buoy/laser
    /// `Perception` contract, applied to a single particle and multiplied into its weight.
    pub fn rate(&mut self, particle_index: usize, measurement: &Measurement) -> Option<Real> {
        let likelihood = {
            let particle = self.filter.particles().get(particle_index)?;
            measurement.likelihood(particle, &self.map, self.statics_or_default())
        };
        self.filter.apply_likelihood(particle_index, likelihood, 1.0);
        Some(likelihood)
    }

    /// `getCloud(particle)`.
    pub fn get_cloud(&self, particle_index: usize) -> Vec<CloudPoint> {
        let Some(particle) = self.filter.particles().get(particle_index) else {
            return Vec::new();
        };
        self.map.get_cloud(
            &particle.depth_cells,
            &particle.obstacle_cells,
            self.config.feature_output_confidence_threshold,
            self.config.feature_observation_count_threshold,
        )
    }

    /// `getSimpleGrid(particle, out)`.
    pub fn get_simple_grid(&self, particle_index: usize, out: &mut SimpleGrid) -> usize {
        let Some(particle) = self.filter.particles().get(particle_index) else {
            return 0;
        };
        self.map.get_simple_grid(
            &particle.obstacle_cells,
            self.config.feature_output_confidence_threshold,
            self.config.feature_observation_count_threshold,
            out,
        )
    }

    /// Particle-filter lifecycle: propagation under motion (`dynamic`, spec.md §4.E.2).
    /// `clock` supplies the control timestamp; `depth_sample` is the direct depth reading
    /// that overwrites every particle's `z` (depth is observed, not dead-reckoned).
    pub fn propagate<R: Rng + ?Sized>(
        &mut self,
        control: &MotionControl,
        vehicle_yaw: Real,
        depth_sample: Real,
        rng: &mut R,
    ) {
        self.filter.propagate(&self.config, control, vehicle_yaw, depth_sample, rng);
    }

    /// Particle-filter lifecycle: normalize weights, compute ESS, and resample if warranted
    /// (spec.md §4.E.3/§4.E.5/§4.E.7). This is the one call that may invalidate feature
    /// refcounts across the whole particle set, so it takes `rng` to drive the systematic
    /// draw.
    pub fn normalize_and_resample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> WeightOutcome {
        let (ess, zero_weight_count) = self.filter.normalize(&mut self.workspace, &mut self.diagnostics);
        self.filter
            .maybe_resample(&self.config, &mut self.map, &mut self.workspace, ess, zero_weight_count, rng)
    }

    /// Particle-filter lifecycle: interspersal (spec.md §4.E.6), using
    /// `config.hough_interspersal_ratio` as the replacement fraction.
    pub fn intersperse<R: Rng + ?Sized>(&mut self, mean: Vector3<Real>, cov: Matrix3<Real>, rng: &mut R) {
        let ratio = self.config.hough_interspersal_ratio;
        self.filter.intersperse(mean, cov, ratio, &mut self.map, rng);
    }

    /// Convenience: reads `clock.now()` for callers that would otherwise thread a raw
    /// `Timestamp` through every call site.
    pub fn now(&self, clock: &dyn Clock) -> Timestamp {
        clock.now()
    }
}
