//! Low-variance (systematic) resampling (spec.md §4.E.5).

use rand::Rng;

use crate::numeric_types::Real;

/// Draws `n` parent indices from `weights` (assumed to already sum to ~1) using a single
/// uniform draw `u0` in `[0, 1/n)`, then `n - 1` evenly spaced draws after it. Exposed with an
/// explicit `u0` so tests can pin the draw and assert the exact selection.
pub fn low_variance_draws(weights: &[Real], n: usize, u0: Real) -> Vec<usize> {
    if n == 0 || weights.is_empty() {
        return Vec::new();
    }

    let mut cumulative = Vec::with_capacity(weights.len());
    let mut running = 0.0;
    for &w in weights {
        running += w;
        cumulative.push(running);
    }
    // Guard against floating point drift leaving the last cumulative slightly under 1.0.
    let total = *cumulative.last().unwrap();

    let step = total / (n as Real);
    let mut draws = Vec::with_capacity(n);
    let mut i = 0usize;
    for k in 0..n {
        let target = u0 + step * k as Real;
        while i + 1 < cumulative.len() && cumulative[i] < target {
            i += 1;
        }
        draws.push(i);
    }
    draws
}

/// Convenience wrapper: draws `u0` from `rng` and calls [`low_variance_draws`].
pub fn systematic_resample<R: Rng + ?Sized>(weights: &[Real], rng: &mut R) -> Vec<usize> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }
    let total: Real = weights.iter().sum();
    let step = total / (n as Real);
    let u0 = rng.gen_range(0.0..step.max(Real::MIN_POSITIVE));
    low_variance_draws(weights, n, u0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concentrated_weight_selects_single_particle() {
        // End-to-end scenario 4: one particle has weight 1, rest 0.
        let mut weights = vec![0.0; 100];
        weights[42] = 1.0;
        let draws = low_variance_draws(&weights, 100, 0.0005);
        assert!(draws.iter().all(|&i| i == 42));
        assert_eq!(draws.len(), 100);
    }

    #[test]
    fn uniform_weights_distribute_evenly() {
        let weights = vec![1.0 / 10.0; 10];
        let draws = low_variance_draws(&weights, 10, 0.0);
        let mut seen = std::collections::HashSet::new();
        for d in draws {
            seen.insert(d);
        }
        assert_eq!(seen.len(), 10);
    }
}
