//! Closed-form exponential integrals used by the four-stream solution.
//!
//! `J1(k, l, t) = ∫₀ᵗ e^{-k(t-x)} e^{-lx} dx` and
//! `J2(k, l, t) = ∫₀ᵗ e^{-k x} e^{-l x} dx`, the first with a Taylor branch
//! around its removable singularity at `k = l`.

use ndarray::{Array1, ArrayView1, Zip};
use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::prelude::*;

use crate::error::{broadcast_to, SailError};

/// `|k - l| * t` at which [`jfunc1`] switches to its series form.
pub const JFUNC_SWITCH: f64 = 1e-3;

#[inline]
pub fn jfunc1(k: f64, l: f64, t: f64) -> f64 {
    let del = (k - l) * t;
    if del.abs() > JFUNC_SWITCH {
        ((-l * t).exp() - (-k * t).exp()) / (k - l)
    } else {
        0.5 * t * ((-k * t).exp() + (-l * t).exp()) * (1.0 - del * del / 12.0)
    }
}

#[inline]
pub fn jfunc2(k: f64, l: f64, t: f64) -> f64 {
    (1.0 - (-(k + l) * t).exp()) / (k + l)
}

fn apply_elementwise(
    f: fn(f64, f64, f64) -> f64,
    k: ArrayView1<f64>,
    l: ArrayView1<f64>,
    t: ArrayView1<f64>,
) -> Result<Array1<f64>, SailError> {
    let n = k.len().max(l.len()).max(t.len());
    let k = broadcast_to("k", &k, n)?;
    let l = broadcast_to("l", &l, n)?;
    let t = broadcast_to("t", &t, n)?;
    Ok(Zip::from(&k)
        .and(&l)
        .and(&t)
        .map_collect(|&k, &l, &t| f(k, l, t)))
}

/// Element-wise [`jfunc1`]; length-1 inputs broadcast.
pub fn jfunc1_array(
    k: ArrayView1<f64>,
    l: ArrayView1<f64>,
    t: ArrayView1<f64>,
) -> Result<Array1<f64>, SailError> {
    apply_elementwise(jfunc1, k, l, t)
}

/// Element-wise [`jfunc2`]; length-1 inputs broadcast.
pub fn jfunc2_array(
    k: ArrayView1<f64>,
    l: ArrayView1<f64>,
    t: ArrayView1<f64>,
) -> Result<Array1<f64>, SailError> {
    apply_elementwise(jfunc2, k, l, t)
}

// ── PyO3 wrappers ───────────────────────────────────────────────────────────

/// J1 function with avoidance of the k = l singularity.
#[pyfunction]
#[pyo3(name = "jfunc1")]
pub fn jfunc1_py(k: f64, l: f64, t: f64) -> f64 {
    jfunc1(k, l, t)
}

/// J2 function.
#[pyfunction]
#[pyo3(name = "jfunc2")]
pub fn jfunc2_py(k: f64, l: f64, t: f64) -> f64 {
    jfunc2(k, l, t)
}

#[pyfunction]
pub fn jfunc1_vec<'py>(
    py: Python<'py>,
    k: PyReadonlyArray1<'py, f64>,
    l: PyReadonlyArray1<'py, f64>,
    t: PyReadonlyArray1<'py, f64>,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let out = jfunc1_array(k.as_array(), l.as_array(), t.as_array())?;
    Ok(PyArray1::from_owned_array(py, out))
}

#[pyfunction]
pub fn jfunc2_vec<'py>(
    py: Python<'py>,
    k: PyReadonlyArray1<'py, f64>,
    l: PyReadonlyArray1<'py, f64>,
    t: PyReadonlyArray1<'py, f64>,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let out = jfunc2_array(k.as_array(), l.as_array(), t.as_array())?;
    Ok(PyArray1::from_owned_array(py, out))
}
