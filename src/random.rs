//! Random primitives: uniform and multivariate Gaussian sampling, Gaussian pdf.
//!
//! Grounded on the robotics-adjacent manifests in the retrieval pack that reach for
//! `rand`/`rand_distr` for exactly this kind of motion/perception noise (rather than
//! hand-rolling a Box-Muller transform).

use nalgebra::{Matrix3, Vector3};
use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::numeric_types::Real;

/// Draws a single value uniformly from `[lo, hi)`. Degenerates to returning `lo` when
/// `hi <= lo` rather than panicking, since an empty initialization box (e.g. a single-axis
/// degenerate `init_variance`) is a legitimate configuration.
pub fn uniform_range<R: Rng + ?Sized>(rng: &mut R, lo: Real, hi: Real) -> Real {
    if hi <= lo {
        return lo;
    }
    rng.gen_range(lo..hi)
}

/// Draws a point uniformly from the axis-aligned box centered at `center` with full
/// per-axis widths `width` (i.e. `[center - width/2, center + width/2]` on each axis).
pub fn uniform_box<R: Rng + ?Sized>(rng: &mut R, center: Vector3<Real>, width: Vector3<Real>) -> Vector3<Real> {
    Vector3::new(
        uniform_range(rng, center.x - width.x * 0.5, center.x + width.x * 0.5),
        uniform_range(rng, center.y - width.y * 0.5, center.y + width.y * 0.5),
        uniform_range(rng, center.z - width.z * 0.5, center.z + width.z * 0.5),
    )
}

/// Draws one sample from `N(mean, cov)` for a 3-vector, via the Cholesky factorization of
/// `cov` applied to three iid standard normals. If `cov` is not positive semi-definite
/// (Cholesky fails), falls back to treating the diagonal as independent per-axis variances —
/// this keeps the sampler infallible for slightly-degenerate covariances coming from sensor
/// drivers, at the cost of ignoring off-diagonal correlation in that fallback case.
pub fn multivariate_gaussian_3d<R: Rng + ?Sized>(
    rng: &mut R,
    mean: Vector3<Real>,
    cov: Matrix3<Real>,
) -> Vector3<Real> {
    let z: Vector3<Real> = Vector3::new(
        StandardNormal.sample(rng),
        StandardNormal.sample(rng),
        StandardNormal.sample(rng),
    );

    let offset = match cov.cholesky() {
        Some(chol) => chol.l() * z,
        None => Vector3::new(
            cov[(0, 0)].max(0.0).sqrt() * z.x,
            cov[(1, 1)].max(0.0).sqrt() * z.y,
            cov[(2, 2)].max(0.0).sqrt() * z.z,
        ),
    };

    mean + offset
}

/// Draws one sample from the 1D normal distribution `N(mean, variance)`. Returns `mean`
/// unchanged if `variance` is not positive, since a zero-noise axis is valid configuration.
pub fn gaussian_1d<R: Rng + ?Sized>(rng: &mut R, mean: Real, variance: Real) -> Real {
    if variance <= 0.0 {
        return mean;
    }
    let normal = Normal::new(mean, variance.sqrt()).expect("variance already checked positive");
    normal.sample(rng)
}

/// Gaussian probability density `N(mean, variance)` evaluated at `x`.
///
/// Returns a point mass of `1.0` at `x == mean` when `variance <= 0`, matching the
/// degenerate-sensor convention used by [`gaussian_1d`].
pub fn gaussian_pdf_1d(mean: Real, variance: Real, x: Real) -> Real {
    if variance <= 0.0 {
        return if (x - mean).abs() < Real::EPSILON {
            1.0
        } else {
            0.0
        };
    }
    let diff = x - mean;
    (-0.5 * diff * diff / variance).exp() / (2.0 * std::f64::consts::PI * variance).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn gaussian_pdf_peaks_at_mean() {
        let at_mean = gaussian_pdf_1d(0.0, 1.0, 0.0);
        let away = gaussian_pdf_1d(0.0, 1.0, 2.0);
        assert!(at_mean > away);
    }

    #[test]
    fn gaussian_pdf_matches_scenario_six() {
        // End-to-end scenario 6: nearestDistance residual of 0 against sigma^2.
        let sigma2 = 0.05;
        let expected = 1.0 / (2.0 * std::f64::consts::PI * sigma2).sqrt();
        assert!((gaussian_pdf_1d(0.0, sigma2, 0.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn uniform_range_is_bounded() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let v = uniform_range(&mut rng, -1.0, 1.0);
            assert!((-1.0..1.0).contains(&v));
        }
    }

    #[test]
    fn uniform_range_degenerate_returns_lo() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(uniform_range(&mut rng, 2.0, 2.0), 2.0);
        assert_eq!(uniform_range(&mut rng, 5.0, 1.0), 5.0);
    }

    #[test]
    fn multivariate_gaussian_identity_matches_independent_axes() {
        let mut rng = StdRng::seed_from_u64(7);
        let mean = Vector3::new(1.0, 2.0, 3.0);
        let cov = Matrix3::from_diagonal(&Vector3::new(0.25, 0.25, 0.25));
        let mut sum = Vector3::zeros();
        let n = 20_000;
        for _ in 0..n {
            sum += multivariate_gaussian_3d(&mut rng, mean, cov);
        }
        let avg = sum / (n as Real);
        assert!((avg - mean).abs().max() < 0.05);
    }
}
