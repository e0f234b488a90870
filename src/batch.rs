//! Batched 4SAIL over many independent canopies.
//!
//! Each element carries its own LAI, hotspot, LIDF column, geometry, leaf
//! optics and soil reflectance. Length-1 inputs (and a single LIDF column)
//! broadcast to the batch size.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use numpy::{PyReadonlyArray1, PyReadonlyArray2};
use pyo3::prelude::*;
use rayon::prelude::*;

use crate::error::{broadcast_to, check_len, SailError};
use crate::sail::{
    four_sail_band, CanopyGeometry, FourSailOutput, FourSailResult, FourSailSpectra, LeafOptics,
};

/// Run 4SAIL for `N` canopies in parallel.
///
/// `lidf` has shape `(n_bins, N)` or `(n_bins, 1)`. Every 1-D input has length
/// `N` or 1. When geometry and LIDF are shared by the whole batch the
/// aggregation is done once.
#[allow(clippy::too_many_arguments)]
pub fn four_sail_batch(
    lai: ArrayView1<f64>,
    hotspot: ArrayView1<f64>,
    lidf: ArrayView2<f64>,
    tts: ArrayView1<f64>,
    tto: ArrayView1<f64>,
    psi: ArrayView1<f64>,
    rho: ArrayView1<f64>,
    tau: ArrayView1<f64>,
    rsoil: ArrayView1<f64>,
) -> Result<FourSailSpectra, SailError> {
    let (n_bins, lidf_cols) = lidf.dim();
    if n_bins == 0 {
        return Err(SailError::EmptyLidf);
    }

    let n = [
        lai.len(),
        hotspot.len(),
        tts.len(),
        tto.len(),
        psi.len(),
        rho.len(),
        tau.len(),
        rsoil.len(),
        lidf_cols,
    ]
    .into_iter()
    .max()
    .unwrap_or(0);

    let shared_geometry =
        lidf_cols == 1 && tts.len() == 1 && tto.len() == 1 && psi.len() == 1;

    check_len("lidf columns", n, lidf_cols)?;
    let lai = broadcast_to("lai", &lai, n)?;
    let hotspot = broadcast_to("hotspot", &hotspot, n)?;
    let tts = broadcast_to("tts", &tts, n)?;
    let tto = broadcast_to("tto", &tto, n)?;
    let psi = broadcast_to("psi", &psi, n)?;
    let rho = broadcast_to("rho", &rho, n)?;
    let tau = broadcast_to("tau", &tau, n)?;
    let rsoil = broadcast_to("rsoil", &rsoil, n)?;

    let shared = if shared_geometry && n > 0 {
        Some(CanopyGeometry::new(
            tts[0],
            tto[0],
            psi[0],
            lidf.index_axis(Axis(1), 0),
        ))
    } else {
        None
    };

    log::debug!(
        "four_sail_batch: {n} canopies, {n_bins} leaf angle bins, shared geometry: {}",
        shared.is_some()
    );

    let results: Vec<FourSailResult> = (0..n)
        .into_par_iter()
        .map(|i| {
            let canopy = match shared {
                Some(canopy) => canopy,
                None => {
                    let col = if lidf_cols == 1 { 0 } else { i };
                    CanopyGeometry::new(tts[i], tto[i], psi[i], lidf.index_axis(Axis(1), col))
                }
            };
            four_sail_band(
                &canopy,
                lai[i],
                hotspot[i],
                LeafOptics::new(rho[i], tau[i]),
                rsoil[i],
            )
        })
        .collect();

    Ok(FourSailSpectra::from_results(Array1::from_vec(results).view()))
}

// ── PyO3 wrappers ───────────────────────────────────────────────────────────

/// Batched 4SAIL over many canopies.
///
/// Parameters:
/// - lai, hotspot: per-canopy structure (length N or 1)
/// - lidf: Leaf inclination distributions, shape (n_bins, N) or (n_bins, 1)
/// - tts, tto, psi: per-canopy geometry in degrees (length N or 1)
/// - rho, tau: per-canopy leaf optics (length N or 1)
/// - rsoil: per-canopy soil reflectance (length N or 1)
///
/// Returns FourSailOutput with one element per canopy.
#[pyfunction]
#[allow(clippy::too_many_arguments)]
pub fn four_sail_vec(
    py: Python<'_>,
    lai: PyReadonlyArray1<f64>,
    hotspot: PyReadonlyArray1<f64>,
    lidf: PyReadonlyArray2<f64>,
    tts: PyReadonlyArray1<f64>,
    tto: PyReadonlyArray1<f64>,
    psi: PyReadonlyArray1<f64>,
    rho: PyReadonlyArray1<f64>,
    tau: PyReadonlyArray1<f64>,
    rsoil: PyReadonlyArray1<f64>,
) -> PyResult<FourSailOutput> {
    let lai = lai.as_array();
    let hotspot = hotspot.as_array();
    let lidf = lidf.as_array();
    let tts = tts.as_array();
    let tto = tto.as_array();
    let psi = psi.as_array();
    let rho = rho.as_array();
    let tau = tau.as_array();
    let rsoil = rsoil.as_array();

    let spectra = py.allow_threads(|| {
        four_sail_batch(lai, hotspot, lidf, tts, tto, psi, rho, tau, rsoil)
    })?;
    Ok(FourSailOutput::from_spectra(py, spectra))
}
