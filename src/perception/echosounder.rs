//! Echosounder depth sample observation (spec.md §4.D.1): shapes the map, does not itself
//! change particle weight.

use crate::error::Diagnostic;
use crate::filter::particle::PoseParticle;
use crate::map::{CellAssociation, DpMap};
use crate::numeric_types::{FeatureId, Real, Timestamp};

/// Updates `particle`'s depth association at its current `(x, y)` cell with `depth`/`variance`,
/// extending the existing association if one exists or allocating a fresh one otherwise.
/// Returns the particle's weight unchanged, matching the spec: this observation shapes the
/// map, not the particle's confidence.
#[allow(clippy::too_many_arguments)]
pub fn observe_depth_sample(
    particle: &mut PoseParticle,
    map: &mut DpMap,
    depth: Real,
    variance: Real,
    consistency_k: Real,
    confidence_step: Real,
    now: Timestamp,
    diagnostics: &mut Vec<Diagnostic>,
    particle_index: usize,
) -> Real {
    let Some((ix, iy)) = map.grid().to_grid(particle.position.x, particle.position.y) else {
        diagnostics.push(Diagnostic::new(crate::error::EngineError::OutOfWorld).for_particle(particle_index));
        return particle.weight;
    };
    let key = (ix, iy);

    let parent_id = particle.depth_cells.get(&key).map(|a| a.id).unwrap_or(FeatureId::ROOT);
    let new_id = map.set_depth(ix, iy, depth, variance, parent_id, consistency_k, confidence_step, now);

    if new_id.is_root() {
        if !parent_id.is_root() {
            particle.depth_cells.remove(&key);
            diagnostics.push(
                Diagnostic::new(crate::error::EngineError::StaleAssociation(parent_id)).for_particle(particle_index),
            );
        }
        return particle.weight;
    }

    // Refcounts must move atomically with the association itself (spec.md §5): the new node
    // gains a reference the instant the particle starts pointing at it, and the previous node
    // (if this was a branch rather than an in-place extend, where `new_id == parent_id`) loses
    // the one this particle used to hold.
    if new_id != parent_id {
        if !parent_id.is_root() {
            map.drop_depth_refcount(key, parent_id);
        }
        map.bump_depth_refcount(key, new_id);
    }

    particle.depth_cells.insert(
        key,
        CellAssociation {
            discrete: (particle.position.x, particle.position.y),
            id: new_id,
        },
    );
    particle.weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Vector2, Vector3};

    fn map() -> DpMap {
        DpMap::new(Vector2::new(5.0, 5.0), Vector2::new(10.0, 10.0), 1.0)
    }

    #[test]
    fn allocates_then_extends_on_repeated_observation() {
        let mut m = map();
        let mut p = PoseParticle::new(Vector3::new(3.5, 3.5, -5.0), 1.0);
        let mut diagnostics = Vec::new();
        let w1 = observe_depth_sample(&mut p, &mut m, -5.0, 0.1, 3.0, 0.2, 0.0, &mut diagnostics, 0);
        assert_eq!(w1, p.weight);
        let key = m.grid().to_grid(3.5, 3.5).unwrap();
        let first_id = p.depth_cells.get(&key).unwrap().id;
        assert!(!first_id.is_root());
        assert_eq!(m.cell_depth_node(key, first_id).unwrap().refcount, 1);

        observe_depth_sample(&mut p, &mut m, -5.02, 0.1, 3.0, 0.2, 1.0, &mut diagnostics, 0);
        let second_id = p.depth_cells.get(&key).unwrap().id;
        assert_eq!(first_id, second_id);
        assert!(diagnostics.is_empty());
        // Extending in place must not double-count the reference.
        assert_eq!(m.cell_depth_node(key, second_id).unwrap().refcount, 1);
    }

    #[test]
    fn branching_to_a_child_moves_the_refcount_off_the_parent() {
        let mut m = map();
        let mut p = PoseParticle::new(Vector3::new(3.5, 3.5, -5.0), 1.0);
        let mut diagnostics = Vec::new();
        observe_depth_sample(&mut p, &mut m, -5.0, 0.01, 1.0, 0.2, 0.0, &mut diagnostics, 0);
        let key = m.grid().to_grid(3.5, 3.5).unwrap();
        let parent_id = p.depth_cells.get(&key).unwrap().id;

        // 10 meters off is far beyond 1-sigma of a 0.01 variance estimate: branches to a child.
        observe_depth_sample(&mut p, &mut m, 5.0, 0.01, 1.0, 0.2, 1.0, &mut diagnostics, 0);
        let child_id = p.depth_cells.get(&key).unwrap().id;
        assert_ne!(parent_id, child_id);
        assert_eq!(m.cell_depth_node(key, parent_id).unwrap().refcount, 0);
        assert_eq!(m.cell_depth_node(key, child_id).unwrap().refcount, 1);
    }

    #[test]
    fn out_of_world_position_reports_diagnostic() {
        let mut m = map();
        let mut p = PoseParticle::new(Vector3::new(1000.0, 1000.0, -5.0), 1.0);
        let mut diagnostics = Vec::new();
        observe_depth_sample(&mut p, &mut m, -5.0, 0.1, 3.0, 0.2, 0.0, &mut diagnostics, 7);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].particle, Some(7));
    }
}
