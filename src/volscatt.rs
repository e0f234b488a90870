//! SAIL volume scattering phase function and interception coefficients
//! for a single leaf inclination class (after W. Verhoef, 2001).

use ndarray::{Array1, ArrayView1, Zip};
use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::prelude::*;

use crate::error::{broadcast_to, SailError};

const PI: f64 = std::f64::consts::PI;
const DEG2RAD: f64 = PI / 180.0;

/// Below this, the projected leaf sine is treated as zero.
const SINE_THRESHOLD: f64 = 1e-6;

/// Interception and area-scattering fractions for one leaf angle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeScattering {
    /// Interception function in the solar path.
    pub chi_s: f64,
    /// Interception function in the view path.
    pub chi_o: f64,
    /// Multiplier of leaf reflectance in the volume scattering.
    pub frho: f64,
    /// Multiplier of leaf transmittance in the volume scattering.
    pub ftau: f64,
}

/// Volume scattering for sun zenith `tts`, view zenith `tto`, relative azimuth
/// `psi` and leaf inclination `ttl`, all in degrees.
pub fn volscatt(tts: f64, tto: f64, psi: f64, ttl: f64) -> VolumeScattering {
    let cts = (tts * DEG2RAD).cos();
    let cto = (tto * DEG2RAD).cos();
    let sts = (tts * DEG2RAD).sin();
    let sto = (tto * DEG2RAD).sin();
    let psir = psi * DEG2RAD;
    let cospsi = psir.cos();
    let cttl = (ttl * DEG2RAD).cos();
    let sttl = (ttl * DEG2RAD).sin();

    let cs = cttl * cts;
    let co = cttl * cto;
    let ss = sttl * sts;
    let so = sttl * sto;

    let cosbts = if ss.abs() > SINE_THRESHOLD { -cs / ss } else { 5.0 };
    let cosbto = if so.abs() > SINE_THRESHOLD { -co / so } else { 5.0 };

    let (bts, ds) = if cosbts.abs() < 1.0 {
        (cosbts.acos(), ss)
    } else {
        (PI, cs)
    };
    let chi_s = 2.0 / PI * ((bts - PI * 0.5) * cs + bts.sin() * ss);

    let (bto, do_) = if cosbto.abs() < 1.0 {
        (cosbto.acos(), so)
    } else if tto < 90.0 {
        (PI, co)
    } else {
        (0.0, -co)
    };
    let chi_o = 2.0 / PI * ((bto - PI * 0.5) * co + bto.sin() * so);

    // Ordered azimuth break angles bt1 <= bt2 <= bt3
    let btran1 = (bts - bto).abs();
    let btran2 = PI - (bts + bto - PI).abs();
    let (bt1, bt2, bt3) = if psir <= btran1 {
        (psir, btran1, btran2)
    } else if psir <= btran2 {
        (btran1, psir, btran2)
    } else {
        (btran1, btran2, psir)
    };

    let t1 = 2.0 * cs * co + ss * so * cospsi;
    let t2 = if bt2 > 0.0 {
        bt2.sin() * (2.0 * ds * do_ + ss * so * bt1.cos() * bt3.cos())
    } else {
        0.0
    };

    let denom = 2.0 * PI * PI;
    let frho = ((PI - bt2) * t1 + t2) / denom;
    let ftau = (-bt2 * t1 + t2) / denom;

    VolumeScattering {
        chi_s,
        chi_o,
        frho: frho.max(0.0),
        ftau: ftau.max(0.0),
    }
}

/// Column-wise result of [`volscatt_batch`].
pub struct VolumeScatteringArrays {
    pub chi_s: Array1<f64>,
    pub chi_o: Array1<f64>,
    pub frho: Array1<f64>,
    pub ftau: Array1<f64>,
}

/// Element-wise [`volscatt`] over sun/view/azimuth arrays for one leaf angle.
///
/// Inputs of length 1 broadcast against the longest one.
pub fn volscatt_batch(
    tts: ArrayView1<f64>,
    tto: ArrayView1<f64>,
    psi: ArrayView1<f64>,
    ttl: f64,
) -> Result<VolumeScatteringArrays, SailError> {
    let n = tts.len().max(tto.len()).max(psi.len());
    let tts = broadcast_to("tts", &tts, n)?;
    let tto = broadcast_to("tto", &tto, n)?;
    let psi = broadcast_to("psi", &psi, n)?;

    let points = Zip::from(&tts)
        .and(&tto)
        .and(&psi)
        .map_collect(|&s, &o, &p| volscatt(s, o, p, ttl));

    let chi_s = points.mapv(|v| v.chi_s);
    let chi_o = points.mapv(|v| v.chi_o);
    let frho = points.mapv(|v| v.frho);
    let ftau = points.mapv(|v| v.ftau);

    Ok(VolumeScatteringArrays {
        chi_s,
        chi_o,
        frho,
        ftau,
    })
}

// ── PyO3 wrappers ───────────────────────────────────────────────────────────

/// Volume scattering functions and interception coefficients.
///
/// Parameters:
/// - tts: Sun zenith angle (degrees)
/// - tto: View zenith angle (degrees)
/// - psi: Relative sun-view azimuth (degrees)
/// - ttl: Leaf inclination angle (degrees)
///
/// Returns tuple `(chi_s, chi_o, frho, ftau)`
#[pyfunction]
#[pyo3(name = "volscatt")]
pub fn volscatt_py(tts: f64, tto: f64, psi: f64, ttl: f64) -> (f64, f64, f64, f64) {
    let v = volscatt(tts, tto, psi, ttl);
    (v.chi_s, v.chi_o, v.frho, v.ftau)
}

/// Array form of `volscatt` for one leaf inclination angle.
///
/// Returns tuple of arrays `(chi_s, chi_o, frho, ftau)`
#[pyfunction]
#[allow(clippy::type_complexity)]
pub fn volscatt_vec<'py>(
    py: Python<'py>,
    tts: PyReadonlyArray1<'py, f64>,
    tto: PyReadonlyArray1<'py, f64>,
    psi: PyReadonlyArray1<'py, f64>,
    ttl: f64,
) -> PyResult<(
    Bound<'py, PyArray1<f64>>,
    Bound<'py, PyArray1<f64>>,
    Bound<'py, PyArray1<f64>>,
    Bound<'py, PyArray1<f64>>,
)> {
    let result = volscatt_batch(tts.as_array(), tto.as_array(), psi.as_array(), ttl)?;
    Ok((
        PyArray1::from_owned_array(py, result.chi_s),
        PyArray1::from_owned_array(py, result.chi_o),
        PyArray1::from_owned_array(py, result.frho),
        PyArray1::from_owned_array(py, result.ftau),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_scattering_fractions_never_negative() {
        let angles = [0.0, 5.0, 15.0, 30.0, 45.0, 60.0, 75.0, 89.0];
        let azimuths = [0.0, 30.0, 90.0, 135.0, 180.0];
        for &tts in &angles {
            for &tto in &angles {
                for &psi in &azimuths {
                    for ttl in [2.5, 27.5, 52.5, 87.5] {
                        let v = volscatt(tts, tto, psi, ttl);
                        assert!(v.frho >= 0.0, "frho < 0 at {tts} {tto} {psi} {ttl}");
                        assert!(v.ftau >= 0.0, "ftau < 0 at {tts} {tto} {psi} {ttl}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_horizontal_leaf_interception() {
        // A horizontal leaf intercepts cos(zenith) of a beam.
        let v = volscatt(30.0, 10.0, 0.0, 0.0);
        assert_abs_diff_eq!(v.chi_s, (30.0 * DEG2RAD).cos(), epsilon = 1e-12);
        assert_abs_diff_eq!(v.chi_o, (10.0 * DEG2RAD).cos(), epsilon = 1e-12);
        // All light is reflected backwards, none transmitted forward.
        assert_eq!(v.ftau, 0.0);
        assert!(v.frho > 0.0);
    }

    #[test]
    fn test_batch_matches_scalar_with_broadcast() {
        let tts = array![10.0, 30.0, 60.0];
        let tto = array![0.0];
        let psi = array![0.0, 90.0, 180.0];
        let out = volscatt_batch(tts.view(), tto.view(), psi.view(), 42.5).unwrap();
        for i in 0..3 {
            let v = volscatt(tts[i], 0.0, psi[i], 42.5);
            assert_eq!(out.chi_s[i], v.chi_s);
            assert_eq!(out.chi_o[i], v.chi_o);
            assert_eq!(out.frho[i], v.frho);
            assert_eq!(out.ftau[i], v.ftau);
        }
    }

    #[test]
    fn test_batch_rejects_mismatched_lengths() {
        let a = array![10.0, 20.0];
        let b = array![10.0, 20.0, 30.0];
        assert!(volscatt_batch(a.view(), b.view(), a.view(), 45.0).is_err());
    }
}
