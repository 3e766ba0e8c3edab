//! Sonar feature sweep observation (spec.md §4.D.2): ray-casts into the grid, updates
//! obstacle associations for matched and empty cells, and rates the particle against the
//! measured returns.

use std::collections::HashSet;

use nalgebra::{Rotation3, Vector2, Vector3};

use crate::config::FilterConfig;
use crate::error::{Diagnostic, EngineError};
use crate::external::{SonarSweep, StaticNodeMap};
use crate::filter::particle::PoseParticle;
use crate::map::{CellAssociation, CellKey, DpMap};
use crate::numeric_types::{FeatureId, Real, Timestamp};
use crate::random::gaussian_pdf_1d;

/// Absolute world-frame beam angle for a sweep observed by a vehicle at `vehicle_yaw`
/// (spec.md §4.D.2 step 1/2).
pub fn absolute_beam_angle(sweep: &SonarSweep, vehicle_yaw: Real, yaw_offset: Real) -> Real {
    sweep.angle + vehicle_yaw + yaw_offset
}

/// Processes one sonar sweep against one particle: ray-casts, updates obstacle associations
/// for matched features and weakens (or touches) unmatched cells along the ray, then rates
/// the particle against the measured returns. Returns the rating score (spec.md §4.D.2 step
/// 5), which the caller multiplies into the particle's weight via
/// [`crate::filter::ParticleFilter::apply_likelihood`].
#[allow(clippy::too_many_arguments)]
pub fn observe_sonar_sweep(
    particle: &mut PoseParticle,
    map: &mut DpMap,
    config: &FilterConfig,
    statics: &dyn StaticNodeMap,
    sweep: &SonarSweep,
    vehicle_yaw: Real,
    now: Timestamp,
    diagnostics: &mut Vec<Diagnostic>,
    particle_index: usize,
) -> Real {
    let abs_angle = absolute_beam_angle(sweep, vehicle_yaw, config.yaw_offset);
    let origin = Vector2::new(particle.position.x, particle.position.y);

    let ray_cells = map.grid().ray_cells(
        origin,
        abs_angle,
        config.feature_observation_minimum_range,
        config.feature_observation_range,
        false,
    );
    let mut unobserved: HashSet<CellKey> = ray_cells.iter().copied().collect();

    let valid_min = config.sonar_minimum_distance.max(config.feature_observation_minimum_range);
    let valid_max = config.sonar_maximum_distance.min(config.feature_observation_range);

    let mut expected_matches = Vec::new(); // (distance_from_particle, confidence, measured_range)

    for feature in &sweep.features {
        let range_m = feature.range_m();
        if range_m < valid_min || range_m > valid_max {
            continue;
        }

        let beam_local = Rotation3::from_axis_angle(&Vector3::z_axis(), sweep.angle) * Vector3::new(range_m, 0.0, 0.0);
        let vehicle_frame_point =
            config.sonar_to_vehicle_transform.rotation_matrix() * beam_local + config.sonar_to_vehicle_transform.translation_vector();
        let world_point = Rotation3::from_axis_angle(&Vector3::z_axis(), vehicle_yaw + config.yaw_offset) * vehicle_frame_point
            + particle.position;

        if !statics.belongs_to_world(world_point) {
            diagnostics.push(Diagnostic::new(EngineError::OutOfWorld).for_particle(particle_index));
            continue;
        }

        let Some((ix, iy)) = map.grid().to_grid(world_point.x, world_point.y) else {
            diagnostics.push(Diagnostic::new(EngineError::OutOfWorld).for_particle(particle_index));
            continue;
        };
        let key = (ix, iy);
        unobserved.remove(&key);

        let half_span = range_m * (config.sonar_vertical_angle * 0.5).sin();
        let z_center = particle.position.z;
        let (zmin, zmax) = (z_center - half_span, z_center + half_span);

        let parent_id = particle.obstacle_cells.get(&key).map(|a| a.id).unwrap_or(FeatureId::ROOT);
        let new_id = map.set_obstacle(ix, iy, true, config.feature_confidence, zmin, zmax, parent_id, now);

        if new_id.is_root() {
            if !parent_id.is_root() {
                particle.obstacle_cells.remove(&key);
                diagnostics
                    .push(Diagnostic::new(EngineError::StaleAssociation(parent_id)).for_particle(particle_index));
            }
            continue;
        }

        // Refcounts move atomically with the association (spec.md §5): bump the node this
        // particle now points at, and release the one it pointed at before, if any.
        if new_id != parent_id {
            if !parent_id.is_root() {
                map.drop_obstacle_refcount(key, parent_id);
            }
            map.bump_obstacle_refcount(key, new_id);
        }

        particle.obstacle_cells.insert(
            key,
            CellAssociation {
                discrete: (world_point.x, world_point.y),
                id: new_id,
            },
        );

        let (cx, cy) = map.grid().to_world(ix, iy);
        let expected_distance = (Vector2::new(cx, cy) - origin).norm();
        if let Some(confidence) = map.live_obstacle_confidence(key, new_id) {
            expected_matches.push((expected_distance, confidence, range_m));
        }
    }

    for &key in &unobserved {
        let (cx, cy) = map.grid().to_world(key.0, key.1);
        let dist = (Vector2::new(cx, cy) - origin).norm();
        let existing = particle.obstacle_cells.get(&key).copied();
        let parent_id = existing.map(|a| a.id).unwrap_or(FeatureId::ROOT);

        if dist <= config.feature_observation_range {
            let new_id = map.set_obstacle(key.0, key.1, false, config.feature_empty_cell_confidence, 0.0, 0.0, parent_id, now);
            if new_id.is_root() {
                particle.obstacle_cells.remove(&key);
                if !parent_id.is_root() {
                    diagnostics
                        .push(Diagnostic::new(EngineError::StaleAssociation(parent_id)).for_particle(particle_index));
                }
            } else {
                if new_id != parent_id {
                    if !parent_id.is_root() {
                        map.drop_obstacle_refcount(key, parent_id);
                    }
                    map.bump_obstacle_refcount(key, new_id);
                }
                particle.obstacle_cells.insert(key, CellAssociation { discrete: (cx, cy), id: new_id });
            }
        } else if let Some(assoc) = existing {
            map.touch_obstacle_feature(key.0, key.1, assoc.id, now);
        }
    }

    rate_particle(&expected_matches, config.sonar_covariance)
}

/// Greedy nearest-distance matching between expected cell distances and measured ranges,
/// confidence-weighted Gaussian likelihood (spec.md §4.D.2 step 5 / `DPSlam::rateParticle`).
fn rate_particle(expected: &[(Real, Real, Real)], sonar_covariance: Real) -> Real {
    if expected.is_empty() {
        return 0.0;
    }

    let mut available: Vec<(Real, Real)> = expected.iter().map(|&(d, c, _)| (d, c)).collect();
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    let mut any_match = false;

    for &(_, _, measured) in expected {
        if available.is_empty() {
            break;
        }
        let (best_index, _) = available
            .iter()
            .enumerate()
            .min_by(|&(_, &(d_a, _)), &(_, &(d_b, _))| {
                (d_a - measured).abs().partial_cmp(&(d_b - measured).abs()).unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("available is non-empty");
        let (expected_distance, confidence) = available.remove(best_index);
        let residual = measured - expected_distance;
        weighted_sum += confidence * gaussian_pdf_1d(0.0, sonar_covariance, residual);
        weight_total += confidence;
        any_match = true;
    }

    if !any_match || weight_total <= 0.0 {
        0.0
    } else {
        weighted_sum / weight_total
    }
}
