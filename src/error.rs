//! Structural errors raised at the array / parameter boundary.
//!
//! The radiative transfer kernels themselves never fail: out-of-range physical
//! inputs propagate through the arithmetic. Only shape and bookkeeping problems
//! end up here.

use ndarray::ArrayView1;
use ndarray_stats::errors::MultiInputError;
use pyo3::exceptions::PyValueError;
use pyo3::PyErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SailError {
    #[error("{name} has length {actual}, expected {expected} (or 1 to broadcast)")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("leaf angle distribution is empty")]
    EmptyLidf,

    #[error("unknown PROSAIL parameter '{0}'")]
    UnknownParameter(String),

    #[error("expected {expected} {what}, got {actual}")]
    WrongCount {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("residual computation failed: {0}")]
    Residuals(#[from] MultiInputError),

    #[error("no residuals to average")]
    NoResiduals,

    #[error("leaf optical model failed: {0}")]
    LeafModel(#[from] PyErr),
}

impl From<SailError> for PyErr {
    fn from(err: SailError) -> PyErr {
        match err {
            SailError::LeafModel(inner) => inner,
            other => PyValueError::new_err(other.to_string()),
        }
    }
}

/// Check that `actual` equals `expected` or is a broadcastable 1.
pub(crate) fn check_len(
    name: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), SailError> {
    if actual == expected || actual == 1 {
        Ok(())
    } else {
        Err(SailError::LengthMismatch {
            name,
            expected,
            actual,
        })
    }
}

/// Broadcast a length-1 view to `n`, or pass an `n`-long view through.
pub(crate) fn broadcast_to<'a>(
    name: &'static str,
    view: &'a ArrayView1<'_, f64>,
    n: usize,
) -> Result<ArrayView1<'a, f64>, SailError> {
    check_len(name, n, view.len())?;
    view.broadcast(n).ok_or(SailError::LengthMismatch {
        name,
        expected: n,
        actual: view.len(),
    })
}
