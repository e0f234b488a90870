//! Sun zenith and azimuth angles from site coordinates and local time.

use ndarray::{Array1, ArrayView1, Zip};
use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::prelude::*;

use crate::error::{broadcast_to, SailError};

const PI: f64 = std::f64::consts::PI;

/// Solar position in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SunAngles {
    /// Sun zenith angle
    pub sza: f64,
    /// Sun azimuth angle, clockwise from north
    pub saa: f64,
}

/// Solar declination (radians) for a day of year.
#[inline]
pub fn declination(doy: f64) -> f64 {
    0.409 * ((2.0 * PI * doy / 365.0) - 1.39).sin()
}

/// Equation of time (minutes) for a declination in radians.
#[inline]
pub fn equation_of_time(declination: f64) -> f64 {
    0.258 * declination.cos() - 7.416 * declination.sin() - 3.648 * (2.0 * declination).cos()
        - 9.228 * (2.0 * declination).sin()
}

/// Hour offset between local standard time and solar time.
#[inline]
fn time_correction(lon: f64, stdlon: f64, declination: f64) -> f64 {
    let lc = (stdlon - lon) / 15.0;
    -equation_of_time(declination) / 60.0 + lc
}

/// Sun angles for a site.
///
/// `lat`/`lon` in degrees, `stdlon` the central longitude of the time zone,
/// `doy` the day of year and `ftime` the local standard time in decimal hours.
pub fn sun_angles(lat: f64, lon: f64, stdlon: f64, doy: f64, ftime: f64) -> SunAngles {
    let decl = declination(doy);
    let solar_time = ftime - time_correction(lon, stdlon, decl);
    let w = (solar_time - 12.0) * 15.0;

    let lat_r = lat.to_radians();
    let w_r = w.to_radians();
    let sin_elev = w_r.cos() * decl.cos() * lat_r.cos() + decl.sin() * lat_r.sin();
    let elev = sin_elev.asin();
    let sza = (PI / 2.0 - elev).to_degrees();

    let cos_phi = (decl.sin() * lat_r.cos() - w_r.cos() * decl.cos() * lat_r.sin()) / elev.cos();
    // Rounding can push |cos_phi| past 1 at solar noon
    let phi = cos_phi.clamp(-1.0, 1.0).acos().to_degrees();
    let saa = if w <= 0.0 { phi } else { 360.0 - phi };

    SunAngles { sza, saa }
}

/// Element-wise [`sun_angles`]; length-1 inputs broadcast.
pub fn sun_angles_array(
    lat: ArrayView1<f64>,
    lon: ArrayView1<f64>,
    stdlon: ArrayView1<f64>,
    doy: ArrayView1<f64>,
    ftime: ArrayView1<f64>,
) -> Result<(Array1<f64>, Array1<f64>), SailError> {
    let n = [lat.len(), lon.len(), stdlon.len(), doy.len(), ftime.len()]
        .into_iter()
        .max()
        .unwrap_or(0);
    let lat = broadcast_to("lat", &lat, n)?;
    let lon = broadcast_to("lon", &lon, n)?;
    let stdlon = broadcast_to("stdlon", &stdlon, n)?;
    let doy = broadcast_to("doy", &doy, n)?;
    let ftime = broadcast_to("ftime", &ftime, n)?;

    let angles = Zip::from(&lat)
        .and(&lon)
        .and(&stdlon)
        .and(&doy)
        .and(&ftime)
        .map_collect(|&lat, &lon, &stdlon, &doy, &ftime| sun_angles(lat, lon, stdlon, doy, ftime));

    Ok((angles.mapv(|a| a.sza), angles.mapv(|a| a.saa)))
}

// ── PyO3 wrappers ───────────────────────────────────────────────────────────

/// Calculate the Sun Zenith and Azimuth Angles (SZA & SAA).
///
/// Parameters:
/// - lat: Latitude of the site (degrees)
/// - lon: Longitude of the site (degrees)
/// - stdlon: Central longitude of the site's time zone (degrees)
/// - doy: Day of year (1-366)
/// - ftime: Time of measurement (decimal hours)
///
/// Returns tuple `(sza, saa)` in degrees
#[pyfunction]
pub fn calc_sun_angles(lat: f64, lon: f64, stdlon: f64, doy: f64, ftime: f64) -> (f64, f64) {
    let a = sun_angles(lat, lon, stdlon, doy, ftime);
    (a.sza, a.saa)
}

/// Array form of `calc_sun_angles`.
#[pyfunction]
pub fn calc_sun_angles_vec<'py>(
    py: Python<'py>,
    lat: PyReadonlyArray1<'py, f64>,
    lon: PyReadonlyArray1<'py, f64>,
    stdlon: PyReadonlyArray1<'py, f64>,
    doy: PyReadonlyArray1<'py, f64>,
    ftime: PyReadonlyArray1<'py, f64>,
) -> PyResult<(Bound<'py, PyArray1<f64>>, Bound<'py, PyArray1<f64>>)> {
    let (sza, saa) = sun_angles_array(
        lat.as_array(),
        lon.as_array(),
        stdlon.as_array(),
        doy.as_array(),
        ftime.as_array(),
    )?;
    Ok((
        PyArray1::from_owned_array(py, sza),
        PyArray1::from_owned_array(py, saa),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn solar_noon(lon: f64, stdlon: f64, doy: f64) -> f64 {
        12.0 + time_correction(lon, stdlon, declination(doy))
    }

    #[test]
    fn test_noon_zenith_equals_latitude_minus_declination() {
        let (lat, lon, stdlon, doy) = (41.0, -3.5, 0.0, 172.0);
        let noon = solar_noon(lon, stdlon, doy);
        let a = sun_angles(lat, lon, stdlon, doy, noon);
        assert_abs_diff_eq!(a.sza, lat - declination(doy).to_degrees(), epsilon = 1e-9);
        assert_abs_diff_eq!(a.saa, 180.0, epsilon = 1e-6);
    }

    #[test]
    fn test_equatorial_equinox_noon_is_overhead() {
        // Declination vanishes where 2*pi*doy/365 = 1.39.
        let doy = 1.39 * 365.0 / (2.0 * PI);
        assert_abs_diff_eq!(declination(doy), 0.0, epsilon = 1e-12);
        let a = sun_angles(0.0, 0.0, 0.0, doy, solar_noon(0.0, 0.0, doy));
        assert_abs_diff_eq!(a.sza, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_morning_and_afternoon_are_mirrored() {
        let (lat, lon, stdlon, doy) = (52.0, 5.0, 15.0, 200.0);
        let noon = solar_noon(lon, stdlon, doy);
        let am = sun_angles(lat, lon, stdlon, doy, noon - 3.0);
        let pm = sun_angles(lat, lon, stdlon, doy, noon + 3.0);
        assert_abs_diff_eq!(am.sza, pm.sza, epsilon = 1e-9);
        assert!(am.saa < 180.0 && am.saa > 0.0);
        assert!(pm.saa > 180.0 && pm.saa < 360.0);
        assert_abs_diff_eq!(am.saa + pm.saa, 360.0, epsilon = 1e-9);
    }

    #[test]
    fn test_array_form_matches_scalar() {
        let ftime = array![7.0, 10.5, 12.0, 16.25];
        let (sza, saa) = sun_angles_array(
            array![38.3].view(),
            array![-0.5].view(),
            array![0.0].view(),
            array![120.0].view(),
            ftime.view(),
        )
        .unwrap();
        for i in 0..4 {
            let a = sun_angles(38.3, -0.5, 0.0, 120.0, ftime[i]);
            assert_eq!(sza[i], a.sza);
            assert_eq!(saa[i], a.saa);
        }
    }
}
