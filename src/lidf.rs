//! Leaf Inclination Distribution Functions.
//!
//! Two generators discretize the leaf inclination density into `n` equal-width
//! bins over 0–90°:
//! - the bimodal two-parameter model of Verhoef (1998),
//! - the ellipsoidal one-parameter model of Campbell (1986, 1990).
//!
//! Both return masses in ascending angle order that sum to one.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray1};
use pyo3::prelude::*;

const DEG2RAD: f64 = std::f64::consts::PI / 180.0;
const PI: f64 = std::f64::consts::PI;

/// Default number of inclination bins.
pub const DEFAULT_BINS: usize = 18;
/// Convergence threshold of the bimodal fixed-point solver.
pub const LIDF_TOLERANCE: f64 = 1e-8;
/// Iteration cap of the bimodal fixed-point solver.
pub const LIDF_MAX_ITERATIONS: usize = 10_000;

/// Discretized leaf inclination distribution.
#[derive(Clone, Debug, PartialEq)]
pub struct LeafAngleDistribution {
    masses: Array1<f64>,
}

impl LeafAngleDistribution {
    pub fn from_masses(masses: Array1<f64>) -> Self {
        Self { masses }
    }

    pub fn verhoef(a: f64, b: f64, n_bins: usize) -> Self {
        Self::from_masses(verhoef_bimodal(a, b, n_bins))
    }

    pub fn campbell(alpha: f64, n_bins: usize) -> Self {
        Self::from_masses(campbell_ellipsoidal(alpha, n_bins))
    }

    pub fn masses(&self) -> ArrayView1<'_, f64> {
        self.masses.view()
    }

    pub fn len(&self) -> usize {
        self.masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    /// Centre of bin `i` in degrees.
    pub fn bin_center_deg(&self, i: usize) -> f64 {
        bin_center_deg(i, self.len())
    }
}

#[inline]
pub(crate) fn bin_center_deg(i: usize, n_bins: usize) -> f64 {
    let step = 90.0 / n_bins as f64;
    i as f64 * step + step / 2.0
}

/// Cumulative frequency of the bimodal model at inclination `theta` (radians).
fn verhoef_cumulative(a: f64, b: f64, theta: f64) -> f64 {
    if a > 1.0 {
        return 1.0 - theta.cos();
    }

    let p = 2.0 * theta;
    let mut x = p;
    let mut y = 0.0;
    let mut converged = false;
    for _ in 0..LIDF_MAX_ITERATIONS {
        y = a * x.sin() + 0.5 * b * (2.0 * x).sin();
        let dx = 0.5 * (y - x + p);
        x += dx;
        if dx.abs() < LIDF_TOLERANCE {
            converged = true;
            break;
        }
    }
    if !converged {
        log::warn!(
            "bimodal LIDF did not converge at {:.3} deg (a={a}, b={b}); |a|+|b| should be < 1",
            theta / DEG2RAD
        );
    }

    (2.0 * y + p) / PI
}

/// Verhoef bimodal LIDF with `n_bins` bins.
///
/// `a` controls the average leaf slope and `b` the bimodality. Typical
/// shapes: planophile (1, 0), erectophile (-1, 0), plagiophile (0, -1),
/// extremophile (0, 1), spherical (-0.35, -0.15), uniform (0, 0).
pub fn verhoef_bimodal(a: f64, b: f64, n_bins: usize) -> Array1<f64> {
    let step = 90.0 / n_bins as f64;
    let mut masses = Array1::<f64>::zeros(n_bins);

    // Walk down from the top bin so each mass is a difference of cumulatives.
    let mut upper = 1.0;
    for i in (0..n_bins).rev() {
        let f = verhoef_cumulative(a, b, i as f64 * step * DEG2RAD);
        masses[i] = upper - f;
        upper = f;
    }

    masses
}

/// Eccentricity of the ellipsoid matching a mean leaf angle (degrees).
#[inline]
pub(crate) fn campbell_eccentricity(alpha: f64) -> f64 {
    (-1.6184e-5 * alpha.powi(3) + 2.1145e-3 * alpha.powi(2) - 1.2390e-1 * alpha + 3.2491).exp()
}

/// Unnormalized mass of the bin `[tl1, tl2)` (radians) for eccentricity `excent`.
fn campbell_bin_mass(excent: f64, tl1: f64, tl2: f64) -> f64 {
    if excent == 1.0 {
        return (tl1.cos() - tl2.cos()).abs();
    }

    let e2 = excent * excent;
    let x1 = excent / (1.0 + e2 * tl1.tan().powi(2)).sqrt();
    let x2 = excent / (1.0 + e2 * tl2.tan().powi(2)).sqrt();
    let alph = excent / (1.0 - e2).abs().sqrt();
    let alph2 = alph * alph;
    let x12 = x1 * x1;
    let x22 = x2 * x2;

    if excent > 1.0 {
        // Oblate
        let alpx1 = (alph2 + x12).sqrt();
        let alpx2 = (alph2 + x22).sqrt();
        let dum = x1 * alpx1 + alph2 * (x1 + alpx1).ln();
        (dum - (x2 * alpx2 + alph2 * (x2 + alpx2).ln())).abs()
    } else {
        // Prolate
        let almx1 = (alph2 - x12).sqrt();
        let almx2 = (alph2 - x22).sqrt();
        let dum = x1 * almx1 + alph2 * (x1 / alph).asin();
        (dum - (x2 * almx2 + alph2 * (x2 / alph).asin())).abs()
    }
}

/// Campbell ellipsoidal LIDF for mean leaf angle `alpha` (degrees).
///
/// 57° approximates a spherical distribution.
pub fn campbell_ellipsoidal(alpha: f64, n_bins: usize) -> Array1<f64> {
    let excent = campbell_eccentricity(alpha);
    let step = 90.0 / n_bins as f64;

    let freq: Vec<f64> = (0..n_bins)
        .map(|i| {
            let tl1 = i as f64 * step * DEG2RAD;
            let tl2 = (i as f64 + 1.0) * step * DEG2RAD;
            campbell_bin_mass(excent, tl1, tl2)
        })
        .collect();

    let total: f64 = freq.iter().sum();
    freq.into_iter().map(|f| f / total).collect()
}

/// Campbell LIDF for many mean leaf angles at once.
///
/// Returns an `(n_bins, alphas.len())` matrix; column `j` is the distribution
/// for `alphas[j]`.
pub fn campbell_ellipsoidal_batch(alphas: ArrayView1<f64>, n_bins: usize) -> Array2<f64> {
    let mut lidf = Array2::<f64>::zeros((n_bins, alphas.len()));
    for (mut column, &alpha) in lidf.axis_iter_mut(Axis(1)).zip(alphas.iter()) {
        column.assign(&campbell_ellipsoidal(alpha, n_bins));
    }
    lidf
}

// ── PyO3 wrappers ───────────────────────────────────────────────────────────

/// Verhoef bimodal Leaf Inclination Distribution Function.
///
/// Parameters:
/// - a: average leaf slope parameter
/// - b: bimodality parameter (|a| + |b| < 1)
/// - n_elements: number of equally spaced inclination bins (default 18)
///
/// Returns: 1D array of bin masses, ascending inclination, summing to 1
#[pyfunction]
#[pyo3(signature = (a, b, n_elements=DEFAULT_BINS))]
pub fn calc_lidf_verhoef(
    py: Python<'_>,
    a: f64,
    b: f64,
    n_elements: usize,
) -> Py<PyArray1<f64>> {
    verhoef_bimodal(a, b, n_elements).into_pyarray(py).unbind()
}

/// Campbell ellipsoidal Leaf Inclination Distribution Function.
///
/// Parameters:
/// - alpha: mean leaf angle (degrees), 57 for a spherical LIDF
/// - n_elements: number of equally spaced inclination bins (default 18)
#[pyfunction]
#[pyo3(signature = (alpha, n_elements=DEFAULT_BINS))]
pub fn calc_lidf_campbell(py: Python<'_>, alpha: f64, n_elements: usize) -> Py<PyArray1<f64>> {
    campbell_ellipsoidal(alpha, n_elements)
        .into_pyarray(py)
        .unbind()
}

/// Campbell LIDF for an array of mean leaf angles.
///
/// Returns a `(n_elements, len(alpha))` array.
#[pyfunction]
#[pyo3(signature = (alpha, n_elements=DEFAULT_BINS))]
pub fn calc_lidf_campbell_vec<'py>(
    py: Python<'py>,
    alpha: PyReadonlyArray1<'py, f64>,
    n_elements: usize,
) -> Bound<'py, PyArray2<f64>> {
    PyArray2::from_owned_array(py, campbell_ellipsoidal_batch(alpha.as_array(), n_elements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn assert_valid(masses: &Array1<f64>) {
        assert!(masses.iter().all(|&m| m >= 0.0), "negative mass in {masses}");
        assert_abs_diff_eq!(masses.sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_verhoef_standard_shapes_normalized() {
        let shapes = [
            (1.0, 0.0),
            (-1.0, 0.0),
            (0.0, -1.0),
            (0.0, 1.0),
            (-0.35, -0.15),
            (0.0, 0.0),
            (0.5, 0.3),
        ];
        for (a, b) in shapes {
            let lidf = verhoef_bimodal(a, b, DEFAULT_BINS);
            assert_eq!(lidf.len(), DEFAULT_BINS);
            assert_valid(&lidf);
        }
    }

    #[test]
    fn test_verhoef_uniform_is_flat() {
        let lidf = verhoef_bimodal(0.0, 0.0, DEFAULT_BINS);
        for &m in lidf.iter() {
            assert_abs_diff_eq!(m, 1.0 / DEFAULT_BINS as f64, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_verhoef_planophile_favours_flat_leaves() {
        let lidf = verhoef_bimodal(1.0, 0.0, DEFAULT_BINS);
        assert!(lidf[0] > lidf[DEFAULT_BINS - 1]);
    }

    #[test]
    fn test_verhoef_slow_fixed_point_still_normalized() {
        // a + |b| near 1 needs many fixed-point steps; the masses must still sum to 1.
        let lidf = verhoef_bimodal(0.9, 0.9, DEFAULT_BINS);
        assert_eq!(lidf.len(), DEFAULT_BINS);
        assert_abs_diff_eq!(lidf.sum(), 1.0, epsilon = 1e-6);
        assert!(lidf.iter().all(|m| m.is_finite()));
    }

    #[test]
    fn test_verhoef_closed_form_above_one() {
        // a > 1 uses 1 - cos(theta), i.e. the spherical distribution.
        let lidf = verhoef_bimodal(1.5, 0.0, 2);
        let c45 = (45.0 * DEG2RAD).cos();
        assert_abs_diff_eq!(lidf[0], 1.0 - c45, epsilon = 1e-12);
        assert_abs_diff_eq!(lidf[1], c45, epsilon = 1e-12);
    }

    #[test]
    fn test_campbell_normalized_over_range() {
        for alpha in [10.0, 30.0, 45.0, 57.0, 70.0, 85.0] {
            let lidf = campbell_ellipsoidal(alpha, DEFAULT_BINS);
            assert_valid(&lidf);
        }
    }

    #[test]
    fn test_campbell_mean_angle_ordering() {
        // Flatter canopies put more mass in the first bin.
        let flat = campbell_ellipsoidal(20.0, DEFAULT_BINS);
        let erect = campbell_ellipsoidal(80.0, DEFAULT_BINS);
        assert!(flat[0] > erect[0]);
        assert!(flat[DEFAULT_BINS - 1] < erect[DEFAULT_BINS - 1]);
    }

    #[test]
    fn test_campbell_batch_matches_scalar() {
        let alphas = array![25.0, 57.0, 80.0];
        let batch = campbell_ellipsoidal_batch(alphas.view(), DEFAULT_BINS);
        assert_eq!(batch.dim(), (DEFAULT_BINS, 3));
        for (j, &alpha) in alphas.iter().enumerate() {
            assert_eq!(batch.column(j), campbell_ellipsoidal(alpha, DEFAULT_BINS));
        }
    }

    #[test]
    fn test_bin_centers() {
        let lidf = LeafAngleDistribution::campbell(57.0, DEFAULT_BINS);
        assert_abs_diff_eq!(lidf.bin_center_deg(0), 2.5);
        assert_abs_diff_eq!(lidf.bin_center_deg(17), 87.5);
    }
}
