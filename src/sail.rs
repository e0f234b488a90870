//! 4SAIL four-stream canopy radiative transfer.
//!
//! Computes the reflectance and transmittance factors of a homogeneous
//! turbid-medium canopy over a Lambertian soil, including the hotspot effect
//! and the "gamma" terms consumed by thermal coupling models.
//!
//! Every execution mode funnels through [`four_sail_band`]:
//! - spectral: one canopy, per-band leaf optics ([`four_sail_spectral`]),
//! - per-wavelength: a cached [`CanopyGeometry`] reused across bands,
//! - batched: many canopies at once (`crate::batch`).
//!
//! Reference: Verhoef, W., Jia, L., Xiao, Q., Su, Z. (2007), Unified
//! optical-thermal four-stream radiative transfer theory for homogeneous
//! vegetation canopies, IEEE TGRS 45(6), 1808–1822.

use ndarray::{Array1, ArrayView1, Zip};
use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::prelude::*;

use crate::error::{broadcast_to, SailError};
use crate::jfunc::{jfunc1, jfunc2};
use crate::lidf::bin_center_deg;
use crate::volscatt::volscatt;

const PI: f64 = std::f64::consts::PI;
const DEG2RAD: f64 = PI / 180.0;

// ── Stability constants ─────────────────────────────────────────────────────

/// Floor applied to divisors that may vanish (sigb, sigf, denom, dn).
pub const MIN_DIVISOR: f64 = 1e-36;
/// Hotspot size parameter used when the hotspot is disabled.
pub const NO_HOTSPOT_ALF: f64 = 1e36;
/// Infinite-canopy reflectance substituted when sigb vanishes.
pub const RINF_CAP: f64 = 1e36;
/// Upper bound on rinf² in the 1/(1 - rinf²) terms.
pub const RINF2_CEILING: f64 = 1.0 - 1e-16;
/// Number of exponential-Simpson steps of the hotspot integral.
pub const HOTSPOT_STEPS: usize = 20;

// ── Inputs ──────────────────────────────────────────────────────────────────

/// Sun / view geometry with its derived trigonometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SunViewGeometry {
    /// Sun zenith angle (degrees)
    pub tts: f64,
    /// View zenith angle (degrees)
    pub tto: f64,
    /// Relative sun-view azimuth (degrees)
    pub psi: f64,
    pub cts: f64,
    pub cto: f64,
    pub tants: f64,
    pub tanto: f64,
    pub cospsi: f64,
    /// Sun-view scatter distance used by the hotspot correlation.
    pub dso: f64,
}

impl SunViewGeometry {
    pub fn new(tts: f64, tto: f64, psi: f64) -> Self {
        let cts = (tts * DEG2RAD).cos();
        let cto = (tto * DEG2RAD).cos();
        let tants = (tts * DEG2RAD).tan();
        let tanto = (tto * DEG2RAD).tan();
        let cospsi = (psi * DEG2RAD).cos();
        let dso = (tants * tants + tanto * tanto - 2.0 * tants * tanto * cospsi).sqrt();
        Self {
            tts,
            tto,
            psi,
            cts,
            cto,
            tants,
            tanto,
            cospsi,
            dso,
        }
    }
}

/// Leaf hemispherical reflectance and transmittance for one band.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeafOptics {
    pub rho: f64,
    pub tau: f64,
}

impl LeafOptics {
    pub fn new(rho: f64, tau: f64) -> Self {
        Self { rho, tau }
    }
}

/// LIDF-weighted extinction and scattering geometry of a canopy.
///
/// Depends only on the sun/view geometry and the leaf angle distribution, so a
/// single aggregation serves every waveband, LAI and soil.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanopyGeometry {
    pub geometry: SunViewGeometry,
    /// Extinction coefficient in the solar direction
    pub ks: f64,
    /// Extinction coefficient in the view direction
    pub ko: f64,
    pub bf: f64,
    /// Area scattering fraction multiplying leaf reflectance
    pub sob: f64,
    /// Area scattering fraction multiplying leaf transmittance
    pub sof: f64,
    pub sdb: f64,
    pub sdf: f64,
    pub dob: f64,
    pub dof: f64,
    pub ddb: f64,
    pub ddf: f64,
}

impl CanopyGeometry {
    /// Aggregate the volume scattering of every LIDF bin.
    ///
    /// Bin `i` of an `n`-bin distribution is evaluated at its centre angle
    /// `(i + 0.5) * 90 / n`.
    pub fn new(tts: f64, tto: f64, psi: f64, lidf: ArrayView1<f64>) -> Self {
        let geometry = SunViewGeometry::new(tts, tto, psi);
        let cts = geometry.cts;
        let cto = geometry.cto;
        let ctscto = cts * cto;
        let n_angles = lidf.len();

        let mut ks = 0.0;
        let mut ko = 0.0;
        let mut bf = 0.0;
        let mut sob = 0.0;
        let mut sof = 0.0;

        for (i, &mass) in lidf.iter().enumerate() {
            let ttl = bin_center_deg(i, n_angles);
            let cttl = (ttl * DEG2RAD).cos();
            let v = volscatt(tts, tto, psi, ttl);

            ks += (v.chi_s / cts) * mass;
            ko += (v.chi_o / cto) * mass;
            bf += (cttl * cttl) * mass;
            sob += (v.frho * PI / ctscto) * mass;
            sof += (v.ftau * PI / ctscto) * mass;
        }

        Self {
            geometry,
            ks,
            ko,
            bf,
            sob,
            sof,
            sdb: 0.5 * (ks + bf),
            sdf: 0.5 * (ks - bf),
            dob: 0.5 * (ko + bf),
            dof: 0.5 * (ko - bf),
            ddb: 0.5 * (1.0 + bf),
            ddf: 0.5 * (1.0 - bf),
        }
    }
}

/// Stream scattering coefficients once leaf optics are known.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamCoefficients {
    pub sigb: f64,
    pub sigf: f64,
    pub att: f64,
    /// Diffuse extinction eigenvalue
    pub m: f64,
    pub sb: f64,
    pub sf: f64,
    pub vb: f64,
    pub vf: f64,
    pub w: f64,
}

impl StreamCoefficients {
    pub fn new(canopy: &CanopyGeometry, leaf: LeafOptics) -> Self {
        let LeafOptics { rho, tau } = leaf;
        let sigb = (canopy.ddb * rho + canopy.ddf * tau).max(MIN_DIVISOR);
        let sigf = (canopy.ddf * rho + canopy.ddb * tau).max(MIN_DIVISOR);
        let att = 1.0 - sigf;
        let radicand = att * att - sigb * sigb;
        let m = if radicand > 0.0 { radicand.sqrt() } else { 0.0 };

        Self {
            sigb,
            sigf,
            att,
            m,
            sb: canopy.sdb * rho + canopy.sdf * tau,
            sf: canopy.sdf * rho + canopy.sdb * tau,
            vb: canopy.dob * rho + canopy.dof * tau,
            vf: canopy.dof * rho + canopy.dob * tau,
            w: canopy.sob * rho + canopy.sof * tau,
        }
    }
}

// ── Outputs ─────────────────────────────────────────────────────────────────

/// The 21 reflectance / transmittance factors of one band.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FourSailResult {
    /// Beam transmittance in the sun-target path
    pub tss: f64,
    /// Beam transmittance in the target-view path
    pub too: f64,
    /// Beam transmittance in the sun-target-view path
    pub tsstoo: f64,
    /// Canopy bihemispherical reflectance
    pub rdd: f64,
    /// Canopy bihemispherical transmittance
    pub tdd: f64,
    /// Canopy directional-hemispherical reflectance
    pub rsd: f64,
    /// Canopy directional-hemispherical transmittance
    pub tsd: f64,
    /// Canopy hemispherical-directional reflectance
    pub rdo: f64,
    /// Canopy hemispherical-directional transmittance
    pub tdo: f64,
    /// Canopy bidirectional reflectance
    pub rso: f64,
    /// Single scattering part of rso
    pub rsos: f64,
    /// Multiple scattering part of rso
    pub rsod: f64,
    /// Surface bihemispherical reflectance
    pub rddt: f64,
    /// Surface directional-hemispherical reflectance
    pub rsdt: f64,
    /// Surface hemispherical-directional reflectance
    pub rdot: f64,
    /// Soil-coupled diffuse part of the surface bidirectional reflectance
    pub rsodt: f64,
    /// Canopy plus directly-viewed soil bidirectional reflectance
    pub rsost: f64,
    /// Surface bidirectional reflectance
    pub rsot: f64,
    pub gammasdf: f64,
    pub gammasdb: f64,
    pub gammaso: f64,
}

impl FourSailResult {
    pub const FIELD_NAMES: [&'static str; 21] = [
        "tss", "too", "tsstoo", "rdd", "tdd", "rsd", "tsd", "rdo", "tdo", "rso", "rsos", "rsod",
        "rddt", "rsdt", "rdot", "rsodt", "rsost", "rsot", "gammasdf", "gammasdb", "gammaso",
    ];

    /// Exact result for a leafless canopy: the surface is bare soil.
    pub fn bare_soil(rsoil: f64) -> Self {
        Self {
            tss: 1.0,
            too: 1.0,
            tsstoo: 1.0,
            rdd: 0.0,
            tdd: 1.0,
            rsd: 0.0,
            tsd: 0.0,
            rdo: 0.0,
            tdo: 0.0,
            rso: 0.0,
            rsos: 0.0,
            rsod: 0.0,
            rddt: rsoil,
            rsdt: rsoil,
            rdot: rsoil,
            rsodt: 0.0,
            rsost: rsoil,
            rsot: rsoil,
            gammasdf: 0.0,
            gammasdb: 0.0,
            gammaso: 0.0,
        }
    }

    /// Values in [`Self::FIELD_NAMES`] order.
    pub fn to_array(&self) -> [f64; 21] {
        [
            self.tss,
            self.too,
            self.tsstoo,
            self.rdd,
            self.tdd,
            self.rsd,
            self.tsd,
            self.rdo,
            self.tdo,
            self.rso,
            self.rsos,
            self.rsod,
            self.rddt,
            self.rsdt,
            self.rdot,
            self.rsodt,
            self.rsost,
            self.rsot,
            self.gammasdf,
            self.gammasdb,
            self.gammaso,
        ]
    }

    /// Surface reflectance under a diffuse sky fraction `skyl`.
    #[inline]
    pub fn canopy_reflectance(&self, skyl: f64) -> f64 {
        self.rdot * skyl + self.rsot * (1.0 - skyl)
    }
}

/// Band-wise arrays of the 21 outputs.
#[derive(Clone, Debug, PartialEq)]
pub struct FourSailSpectra {
    pub tss: Array1<f64>,
    pub too: Array1<f64>,
    pub tsstoo: Array1<f64>,
    pub rdd: Array1<f64>,
    pub tdd: Array1<f64>,
    pub rsd: Array1<f64>,
    pub tsd: Array1<f64>,
    pub rdo: Array1<f64>,
    pub tdo: Array1<f64>,
    pub rso: Array1<f64>,
    pub rsos: Array1<f64>,
    pub rsod: Array1<f64>,
    pub rddt: Array1<f64>,
    pub rsdt: Array1<f64>,
    pub rdot: Array1<f64>,
    pub rsodt: Array1<f64>,
    pub rsost: Array1<f64>,
    pub rsot: Array1<f64>,
    pub gammasdf: Array1<f64>,
    pub gammasdb: Array1<f64>,
    pub gammaso: Array1<f64>,
}

impl FourSailSpectra {
    pub fn from_results(results: ArrayView1<FourSailResult>) -> Self {
        Self {
            tss: results.mapv(|r| r.tss),
            too: results.mapv(|r| r.too),
            tsstoo: results.mapv(|r| r.tsstoo),
            rdd: results.mapv(|r| r.rdd),
            tdd: results.mapv(|r| r.tdd),
            rsd: results.mapv(|r| r.rsd),
            tsd: results.mapv(|r| r.tsd),
            rdo: results.mapv(|r| r.rdo),
            tdo: results.mapv(|r| r.tdo),
            rso: results.mapv(|r| r.rso),
            rsos: results.mapv(|r| r.rsos),
            rsod: results.mapv(|r| r.rsod),
            rddt: results.mapv(|r| r.rddt),
            rsdt: results.mapv(|r| r.rsdt),
            rdot: results.mapv(|r| r.rdot),
            rsodt: results.mapv(|r| r.rsodt),
            rsost: results.mapv(|r| r.rsost),
            rsot: results.mapv(|r| r.rsot),
            gammasdf: results.mapv(|r| r.gammasdf),
            gammasdb: results.mapv(|r| r.gammasdb),
            gammaso: results.mapv(|r| r.gammaso),
        }
    }

    pub fn len(&self) -> usize {
        self.tss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tss.is_empty()
    }

    /// Result of band `i`.
    pub fn get(&self, i: usize) -> Option<FourSailResult> {
        if i >= self.len() {
            return None;
        }
        Some(FourSailResult {
            tss: self.tss[i],
            too: self.too[i],
            tsstoo: self.tsstoo[i],
            rdd: self.rdd[i],
            tdd: self.tdd[i],
            rsd: self.rsd[i],
            tsd: self.tsd[i],
            rdo: self.rdo[i],
            tdo: self.tdo[i],
            rso: self.rso[i],
            rsos: self.rsos[i],
            rsod: self.rsod[i],
            rddt: self.rddt[i],
            rsdt: self.rsdt[i],
            rdot: self.rdot[i],
            rsodt: self.rsodt[i],
            rsost: self.rsost[i],
            rsot: self.rsot[i],
            gammasdf: self.gammasdf[i],
            gammasdb: self.gammasdb[i],
            gammaso: self.gammaso[i],
        })
    }
}

// ── Hotspot ─────────────────────────────────────────────────────────────────

/// Hotspot size parameter `alf`, including the 2/(ks+ko) correction of
/// F.-M. Breon. A non-positive hotspot disables the effect.
#[inline]
pub fn hotspot_alf(dso: f64, hotspot: f64, ks: f64, ko: f64) -> f64 {
    if hotspot > 0.0 {
        (dso / hotspot) * 2.0 / (ks + ko)
    } else {
        NO_HOTSPOT_ALF
    }
}

/// Integrated sun-view joint gap probability.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HotspotIntegral {
    /// ∫₀¹ of the joint probability over the normalized canopy depth
    pub sumint: f64,
    /// Joint sun-view beam transmittance at the canopy bottom
    pub tsstoo: f64,
}

/// Integrate the joint gap probability through the canopy.
///
/// `alf == 0` is the pure hotspot direction and has a closed form. Otherwise a
/// 20-step exponential Simpson rule is used, with step ends placed so that
/// `1 - exp(-alf * x)` is equally partitioned; the last step always ends at
/// `x = 1`. A NaN sum (0/0 on a flat step) is reported as 0.
pub fn hotspot_integral(ks: f64, ko: f64, lai: f64, alf: f64) -> HotspotIntegral {
    let tss = (-ks * lai).exp();

    let (sumint, tsstoo) = if alf == 0.0 {
        ((1.0 - tss) / (ks * lai), tss)
    } else {
        let fhot = lai * (ko * ks).sqrt();
        let fint = (1.0 - (-alf).exp()) * 0.05;
        let mut x1 = 0.0;
        let mut y1 = 0.0;
        let mut f1 = 1.0;
        let mut sumint = 0.0;
        for istep in 1..=HOTSPOT_STEPS {
            let x2 = if istep < HOTSPOT_STEPS {
                -(1.0 - istep as f64 * fint).ln() / alf
            } else {
                1.0
            };
            let y2 = -(ko + ks) * lai * x2 + fhot * (1.0 - (-alf * x2).exp()) / alf;
            let f2 = y2.exp();
            sumint += (f2 - f1) * (x2 - x1) / (y2 - y1);
            x1 = x2;
            y1 = y2;
            f1 = f2;
        }
        (sumint, f1)
    };

    HotspotIntegral {
        sumint: if sumint.is_nan() { 0.0 } else { sumint },
        tsstoo,
    }
}

// ── Solver ──────────────────────────────────────────────────────────────────

/// Run 4SAIL for one band against a pre-aggregated canopy geometry.
///
/// Never fails: out-of-range inputs propagate as NaN/Inf except for the
/// guarded divisions listed on the module constants.
pub fn four_sail_band(
    canopy: &CanopyGeometry,
    lai: f64,
    hotspot: f64,
    leaf: LeafOptics,
    rsoil: f64,
) -> FourSailResult {
    if lai <= 0.0 {
        return FourSailResult::bare_soil(rsoil);
    }

    let CanopyGeometry { ks, ko, .. } = *canopy;
    let StreamCoefficients {
        sigb,
        att,
        m,
        sb,
        sf,
        vb,
        vf,
        w,
        ..
    } = StreamCoefficients::new(canopy, leaf);

    let e1 = (-m * lai).exp();
    let e2 = e1 * e1;
    let rinf = if sigb.abs() >= MIN_DIVISOR {
        (att - m) / sigb
    } else {
        RINF_CAP
    };
    let rinf2 = rinf * rinf;
    let re = rinf * e1;
    let denom = (1.0 - rinf2 * e2).max(MIN_DIVISOR);

    let j1ks = jfunc1(ks, m, lai);
    let j2ks = jfunc2(ks, m, lai);
    let j1ko = jfunc1(ko, m, lai);
    let j2ko = jfunc2(ko, m, lai);

    let pss = (sf + sb * rinf) * j1ks;
    let qss = (sf * rinf + sb) * j2ks;
    let pv = (vf + vb * rinf) * j1ko;
    let qv = (vf * rinf + vb) * j2ko;

    let tdd = (1.0 - rinf2) * e1 / denom;
    let rdd = rinf * (1.0 - e2) / denom;
    let tsd = (pss - re * qss) / denom;
    let rsd = (qss - re * pss) / denom;
    let tdo = (pv - re * qv) / denom;
    let rdo = (qv - re * pv) / denom;

    // Thermal "sd" quantities
    let gammasdf = (1.0 + rinf) * (j1ks - re * j2ks) / denom;
    let gammasdb = (1.0 + rinf) * (-re * j1ks + j2ks) / denom;

    let tss = (-ks * lai).exp();
    let too = (-ko * lai).exp();
    let z = jfunc2(ks, ko, lai);
    let g1 = (z - j1ks * too) / (ko + m);
    let g2 = (z - j1ko * tss) / (ks + m);
    let tv1 = (vf * rinf + vb) * g1;
    let tv2 = (vf + vb * rinf) * g2;
    let t1 = tv1 * (sf + sb * rinf);
    let t2 = tv2 * (sf * rinf + sb);
    let t3 = (rdo * qss + tdo * pss) * rinf;

    // Multiple scattering contribution to the bidirectional reflectance
    let one_minus_rinf2 = 1.0 - rinf2.min(RINF2_CEILING);
    let rsod = (t1 + t2 - t3) / one_minus_rinf2;

    // Thermal "sod" quantity
    let t4 = tv1 * (1.0 + rinf);
    let t5 = tv2 * (1.0 + rinf);
    let t6 = (rdo * j2ks + tdo * j1ks) * (1.0 + rinf) * rinf;
    let gammasod = (t4 + t5 - t6) / one_minus_rinf2;

    // Hotspot and single scattering
    let alf = hotspot_alf(canopy.geometry.dso, hotspot, ks, ko);
    let HotspotIntegral { sumint, tsstoo } = hotspot_integral(ks, ko, lai, alf);
    let rsos = w * lai * sumint;
    let gammasos = ko * lai * sumint;
    let rso = rsos + rsod;
    let gammaso = gammasos + gammasod;

    // Adding the soil
    let dn = (1.0 - rsoil * rdd).max(MIN_DIVISOR);
    let rddt = rdd + tdd * rsoil * tdd / dn;
    let rsdt = rsd + (tsd + tss) * rsoil * tdd / dn;
    let rdot = rdo + tdd * rsoil * (tdo + too) / dn;
    let rsodt = ((tss + tsd) * tdo + (tsd + tss * rsoil * rdd) * too) * rsoil / dn;
    let rsost = rso + tsstoo * rsoil;
    let rsot = rsost + rsodt;

    FourSailResult {
        tss,
        too,
        tsstoo,
        rdd,
        tdd,
        rsd,
        tsd,
        rdo,
        tdo,
        rso,
        rsos,
        rsod,
        rddt,
        rsdt,
        rdot,
        rsodt,
        rsost,
        rsot,
        gammasdf,
        gammasdb,
        gammaso,
    }
}

/// Run 4SAIL for one canopy over many bands.
///
/// The LIDF/geometry aggregation is done once; bands are evaluated in
/// parallel. `rho`, `tau` and `rsoil` must share a length, or be length 1.
#[allow(clippy::too_many_arguments)]
pub fn four_sail_spectral(
    lai: f64,
    hotspot: f64,
    lidf: ArrayView1<f64>,
    tts: f64,
    tto: f64,
    psi: f64,
    rho: ArrayView1<f64>,
    tau: ArrayView1<f64>,
    rsoil: ArrayView1<f64>,
) -> Result<FourSailSpectra, SailError> {
    if lidf.is_empty() {
        return Err(SailError::EmptyLidf);
    }
    let canopy = CanopyGeometry::new(tts, tto, psi, lidf);
    four_sail_spectral_with(&canopy, lai, hotspot, rho, tau, rsoil)
}

/// [`four_sail_spectral`] against an existing canopy aggregation.
pub fn four_sail_spectral_with(
    canopy: &CanopyGeometry,
    lai: f64,
    hotspot: f64,
    rho: ArrayView1<f64>,
    tau: ArrayView1<f64>,
    rsoil: ArrayView1<f64>,
) -> Result<FourSailSpectra, SailError> {
    let n = rho.len().max(tau.len()).max(rsoil.len());
    let rho = broadcast_to("rho", &rho, n)?;
    let tau = broadcast_to("tau", &tau, n)?;
    let rsoil = broadcast_to("rsoil", &rsoil, n)?;

    let results = Zip::from(&rho)
        .and(&tau)
        .and(&rsoil)
        .par_map_collect(|&rho, &tau, &rsoil| {
            four_sail_band(canopy, lai, hotspot, LeafOptics::new(rho, tau), rsoil)
        });

    Ok(FourSailSpectra::from_results(results.view()))
}

// ── PyO3 wrappers ───────────────────────────────────────────────────────────

/// 4SAIL outputs as arrays (one element per band or per canopy).
#[pyclass]
pub struct FourSailOutput {
    #[pyo3(get)]
    pub tss: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub too: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub tsstoo: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub rdd: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub tdd: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub rsd: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub tsd: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub rdo: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub tdo: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub rso: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub rsos: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub rsod: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub rddt: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub rsdt: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub rdot: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub rsodt: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub rsost: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub rsot: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub gammasdf: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub gammasdb: Py<PyArray1<f64>>,
    #[pyo3(get)]
    pub gammaso: Py<PyArray1<f64>>,
}

impl FourSailOutput {
    pub(crate) fn from_spectra(py: Python<'_>, s: FourSailSpectra) -> Self {
        Self {
            tss: PyArray1::from_owned_array(py, s.tss).unbind(),
            too: PyArray1::from_owned_array(py, s.too).unbind(),
            tsstoo: PyArray1::from_owned_array(py, s.tsstoo).unbind(),
            rdd: PyArray1::from_owned_array(py, s.rdd).unbind(),
            tdd: PyArray1::from_owned_array(py, s.tdd).unbind(),
            rsd: PyArray1::from_owned_array(py, s.rsd).unbind(),
            tsd: PyArray1::from_owned_array(py, s.tsd).unbind(),
            rdo: PyArray1::from_owned_array(py, s.rdo).unbind(),
            tdo: PyArray1::from_owned_array(py, s.tdo).unbind(),
            rso: PyArray1::from_owned_array(py, s.rso).unbind(),
            rsos: PyArray1::from_owned_array(py, s.rsos).unbind(),
            rsod: PyArray1::from_owned_array(py, s.rsod).unbind(),
            rddt: PyArray1::from_owned_array(py, s.rddt).unbind(),
            rsdt: PyArray1::from_owned_array(py, s.rsdt).unbind(),
            rdot: PyArray1::from_owned_array(py, s.rdot).unbind(),
            rsodt: PyArray1::from_owned_array(py, s.rsodt).unbind(),
            rsost: PyArray1::from_owned_array(py, s.rsost).unbind(),
            rsot: PyArray1::from_owned_array(py, s.rsot).unbind(),
            gammasdf: PyArray1::from_owned_array(py, s.gammasdf).unbind(),
            gammasdb: PyArray1::from_owned_array(py, s.gammasdb).unbind(),
            gammaso: PyArray1::from_owned_array(py, s.gammaso).unbind(),
        }
    }
}

#[pymethods]
impl FourSailOutput {
    /// All 21 arrays in the classic 4SAIL output order.
    fn as_list(&self, py: Python<'_>) -> Vec<Py<PyArray1<f64>>> {
        [
            &self.tss,
            &self.too,
            &self.tsstoo,
            &self.rdd,
            &self.tdd,
            &self.rsd,
            &self.tsd,
            &self.rdo,
            &self.tdo,
            &self.rso,
            &self.rsos,
            &self.rsod,
            &self.rddt,
            &self.rsdt,
            &self.rdot,
            &self.rsodt,
            &self.rsost,
            &self.rsot,
            &self.gammasdf,
            &self.gammasdb,
            &self.gammaso,
        ]
        .into_iter()
        .map(|a| a.clone_ref(py))
        .collect()
    }

    #[staticmethod]
    fn field_names() -> Vec<&'static str> {
        FourSailResult::FIELD_NAMES.to_vec()
    }
}

/// 4SAIL outputs for a single band.
#[pyclass]
#[derive(Clone)]
pub struct FourSailBand {
    #[pyo3(get)]
    pub tss: f64,
    #[pyo3(get)]
    pub too: f64,
    #[pyo3(get)]
    pub tsstoo: f64,
    #[pyo3(get)]
    pub rdd: f64,
    #[pyo3(get)]
    pub tdd: f64,
    #[pyo3(get)]
    pub rsd: f64,
    #[pyo3(get)]
    pub tsd: f64,
    #[pyo3(get)]
    pub rdo: f64,
    #[pyo3(get)]
    pub tdo: f64,
    #[pyo3(get)]
    pub rso: f64,
    #[pyo3(get)]
    pub rsos: f64,
    #[pyo3(get)]
    pub rsod: f64,
    #[pyo3(get)]
    pub rddt: f64,
    #[pyo3(get)]
    pub rsdt: f64,
    #[pyo3(get)]
    pub rdot: f64,
    #[pyo3(get)]
    pub rsodt: f64,
    #[pyo3(get)]
    pub rsost: f64,
    #[pyo3(get)]
    pub rsot: f64,
    #[pyo3(get)]
    pub gammasdf: f64,
    #[pyo3(get)]
    pub gammasdb: f64,
    #[pyo3(get)]
    pub gammaso: f64,
}

impl From<FourSailResult> for FourSailBand {
    fn from(r: FourSailResult) -> Self {
        Self {
            tss: r.tss,
            too: r.too,
            tsstoo: r.tsstoo,
            rdd: r.rdd,
            tdd: r.tdd,
            rsd: r.rsd,
            tsd: r.tsd,
            rdo: r.rdo,
            tdo: r.tdo,
            rso: r.rso,
            rsos: r.rsos,
            rsod: r.rsod,
            rddt: r.rddt,
            rsdt: r.rsdt,
            rdot: r.rdot,
            rsodt: r.rsodt,
            rsost: r.rsost,
            rsot: r.rsot,
            gammasdf: r.gammasdf,
            gammasdb: r.gammasdb,
            gammaso: r.gammaso,
        }
    }
}

#[pymethods]
impl FourSailBand {
    /// All 21 values in the classic 4SAIL output order.
    fn as_list(&self) -> Vec<f64> {
        vec![
            self.tss,
            self.too,
            self.tsstoo,
            self.rdd,
            self.tdd,
            self.rsd,
            self.tsd,
            self.rdo,
            self.tdo,
            self.rso,
            self.rsos,
            self.rsod,
            self.rddt,
            self.rsdt,
            self.rdot,
            self.rsodt,
            self.rsost,
            self.rsot,
            self.gammasdf,
            self.gammasdb,
            self.gammaso,
        ]
    }

    /// Surface reflectance under a diffuse sky fraction `skyl`.
    fn canopy_reflectance(&self, skyl: f64) -> f64 {
        self.rdot * skyl + self.rsot * (1.0 - skyl)
    }
}

/// Opaque handle to an aggregated canopy geometry.
///
/// Created once per (geometry, LIDF) via `precompute_canopy_geometry()`, then
/// passed to `four_sail_wl()` to skip the LIDF aggregation on every band.
#[pyclass]
pub struct PyCanopyGeometry {
    pub(crate) inner: CanopyGeometry,
}

#[pymethods]
impl PyCanopyGeometry {
    #[getter]
    fn ks(&self) -> f64 {
        self.inner.ks
    }

    #[getter]
    fn ko(&self) -> f64 {
        self.inner.ko
    }

    #[getter]
    fn dso(&self) -> f64 {
        self.inner.geometry.dso
    }
}

fn non_empty_lidf<'a>(
    lidf: &'a PyReadonlyArray1<'_, f64>,
) -> Result<ArrayView1<'a, f64>, SailError> {
    let view = lidf.as_array();
    if view.is_empty() {
        Err(SailError::EmptyLidf)
    } else {
        Ok(view)
    }
}

/// Aggregate the LIDF-weighted scattering geometry for later reuse.
///
/// Parameters:
/// - tts: Sun zenith angle (degrees)
/// - tto: View zenith angle (degrees)
/// - psi: Relative sun-view azimuth (degrees)
/// - lidf: Leaf inclination distribution at regular angle steps
#[pyfunction]
pub fn precompute_canopy_geometry(
    tts: f64,
    tto: f64,
    psi: f64,
    lidf: PyReadonlyArray1<f64>,
) -> PyResult<PyCanopyGeometry> {
    let lidf = non_empty_lidf(&lidf)?;
    Ok(PyCanopyGeometry {
        inner: CanopyGeometry::new(tts, tto, psi, lidf),
    })
}

/// Run the 4SAIL canopy radiative transfer model.
///
/// Parameters:
/// - lai: Leaf Area Index
/// - hotspot: Hotspot parameter (leaf size / canopy height)
/// - lidf: Leaf inclination distribution at regular angle steps
/// - tts: Sun zenith angle (degrees)
/// - tto: View zenith angle (degrees)
/// - psi: Relative sun-view azimuth (degrees)
/// - rho: Leaf reflectance per band
/// - tau: Leaf transmittance per band
/// - rsoil: Soil reflectance per band
///
/// Returns FourSailOutput with one element per band.
#[pyfunction]
#[allow(clippy::too_many_arguments)]
pub fn four_sail(
    py: Python<'_>,
    lai: f64,
    hotspot: f64,
    lidf: PyReadonlyArray1<f64>,
    tts: f64,
    tto: f64,
    psi: f64,
    rho: PyReadonlyArray1<f64>,
    tau: PyReadonlyArray1<f64>,
    rsoil: PyReadonlyArray1<f64>,
) -> PyResult<FourSailOutput> {
    let spectra = four_sail_spectral(
        lai,
        hotspot,
        lidf.as_array(),
        tts,
        tto,
        psi,
        rho.as_array(),
        tau.as_array(),
        rsoil.as_array(),
    )?;
    Ok(FourSailOutput::from_spectra(py, spectra))
}

/// Pick the cached aggregation if there is one, else aggregate `lidf`.
fn resolve_canopy(
    cache: Option<&CanopyGeometry>,
    lidf: Option<ArrayView1<'_, f64>>,
    tts: f64,
    tto: f64,
    psi: f64,
) -> Result<CanopyGeometry, SailError> {
    match (cache, lidf) {
        (Some(cache), _) => Ok(*cache),
        (None, Some(lidf)) if !lidf.is_empty() => Ok(CanopyGeometry::new(tts, tto, psi, lidf)),
        (None, _) => Err(SailError::EmptyLidf),
    }
}

/// Run 4SAIL for a single wavelength.
///
/// When `canopy_cache` (from `precompute_canopy_geometry()`) is given, `lidf`
/// may be `None` and the geometry arguments are ignored. Without a cache,
/// `lidf` is required.
#[pyfunction]
#[pyo3(signature = (lai, hotspot, lidf, tts, tto, psi, rho, tau, rsoil, canopy_cache=None))]
#[allow(clippy::too_many_arguments)]
pub fn four_sail_wl(
    lai: f64,
    hotspot: f64,
    lidf: Option<PyReadonlyArray1<f64>>,
    tts: f64,
    tto: f64,
    psi: f64,
    rho: f64,
    tau: f64,
    rsoil: f64,
    canopy_cache: Option<&PyCanopyGeometry>,
) -> PyResult<FourSailBand> {
    let lidf = lidf.as_ref().map(|l| l.as_array());
    let canopy = resolve_canopy(canopy_cache.map(|c| &c.inner), lidf, tts, tto, psi)?;
    let result = four_sail_band(&canopy, lai, hotspot, LeafOptics::new(rho, tau), rsoil);
    Ok(result.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lidf::{campbell_ellipsoidal, verhoef_bimodal, DEFAULT_BINS};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn spherical_canopy(tts: f64, tto: f64, psi: f64) -> CanopyGeometry {
        let lidf = campbell_ellipsoidal(57.0, DEFAULT_BINS);
        CanopyGeometry::new(tts, tto, psi, lidf.view())
    }

    #[test]
    fn test_bare_soil_for_zero_lai() {
        let canopy = spherical_canopy(35.0, 20.0, 60.0);
        for rsoil in [0.0, 0.15, 0.4] {
            let r = four_sail_band(&canopy, 0.0, 0.1, LeafOptics::new(0.45, 0.4), rsoil);
            assert_eq!(r, FourSailResult::bare_soil(rsoil));
            assert_eq!(r.tss, 1.0);
            assert_eq!(r.too, 1.0);
            assert_eq!(r.tsstoo, 1.0);
            assert_eq!(r.tdd, 1.0);
            assert_eq!(r.rso, 0.0);
            assert_eq!(r.rsot, rsoil);
            assert_eq!(r.rddt, rsoil);
        }
    }

    #[test]
    fn test_negative_lai_is_bare_soil() {
        let canopy = spherical_canopy(30.0, 0.0, 0.0);
        let r = four_sail_band(&canopy, -1.0, 0.01, LeafOptics::new(0.1, 0.05), 0.2);
        assert_eq!(r, FourSailResult::bare_soil(0.2));
    }

    #[test]
    fn test_spherical_extinction_is_half_over_cosine() {
        // A spherical canopy projects G = 0.5 in every direction. Campbell(57)
        // over 18 bins only approximates it (ko = 0.5204 at nadir).
        let canopy = spherical_canopy(40.0, 0.0, 0.0);
        assert_relative_eq!(canopy.ks, 0.5 / (40.0 * DEG2RAD).cos(), max_relative = 5e-2);
        assert_relative_eq!(canopy.ko, 0.5, max_relative = 5e-2);
        assert_relative_eq!(canopy.ko, 0.520_372_053_390_520_1, max_relative = 1e-9);
    }

    #[test]
    fn test_surface_factors_bounded_for_physical_optics() {
        let lidfs = [
            campbell_ellipsoidal(57.0, DEFAULT_BINS),
            campbell_ellipsoidal(25.0, DEFAULT_BINS),
            verhoef_bimodal(-0.35, -0.15, DEFAULT_BINS),
            verhoef_bimodal(1.0, 0.0, DEFAULT_BINS),
        ];
        let optics = [(0.05, 0.02), (0.1, 0.05), (0.45, 0.4)];
        let slack = 1e-9;
        for lidf in &lidfs {
            for (tts, tto, psi) in [(30.0, 0.0, 0.0), (50.0, 30.0, 180.0), (20.0, 40.0, 90.0)] {
                let canopy = CanopyGeometry::new(tts, tto, psi, lidf.view());
                for &(rho, tau) in &optics {
                    for lai in [0.1, 1.0, 3.0, 8.0] {
                        let r = four_sail_band(&canopy, lai, 0.05, LeafOptics::new(rho, tau), 0.2);
                        let factors = [
                            ("rddt", r.rddt),
                            ("rsdt", r.rsdt),
                            ("rdot", r.rdot),
                            ("rsot", r.rsot),
                        ];
                        for (name, v) in factors {
                            assert!(
                                (-slack..=1.0 + slack).contains(&v),
                                "{name} = {v} out of range (lai {lai}, rho {rho}, tau {tau})"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_dense_canopy_hides_soil() {
        let canopy = spherical_canopy(30.0, 0.0, 0.0);
        let leaf = LeafOptics::new(0.1, 0.05);
        let dark = four_sail_band(&canopy, 12.0, 0.01, leaf, 0.0);
        let bright = four_sail_band(&canopy, 12.0, 0.01, leaf, 0.5);
        assert_relative_eq!(dark.rsot, bright.rsot, max_relative = 1e-3);
        assert!(dark.tss < 1e-2);
    }

    #[test]
    fn test_hotspot_direction_uses_closed_form() {
        // Sun and view coincide: dso = 0 so alf = 0.
        let canopy = spherical_canopy(30.0, 30.0, 0.0);
        assert!(canopy.geometry.dso.abs() < 1e-12);
        let lai = 2.0;
        let alf = hotspot_alf(canopy.geometry.dso, 0.1, canopy.ks, canopy.ko);
        let integral = hotspot_integral(canopy.ks, canopy.ko, lai, alf);
        if alf == 0.0 {
            let tss = (-canopy.ks * lai).exp();
            assert_relative_eq!(integral.sumint, (1.0 - tss) / (canopy.ks * lai));
            assert_eq!(integral.tsstoo, tss);
        } else {
            // dso may round to a tiny positive value; quadrature is then near the limit.
            let tss = (-canopy.ks * lai).exp();
            let closed = (1.0 - tss) / (canopy.ks * lai);
            assert_relative_eq!(integral.sumint, closed, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_quadrature_converges_to_pure_hotspot() {
        let ks: f64 = 0.6;
        let ko: f64 = 0.6;
        let lai: f64 = 3.0;
        let tss = (-ks * lai).exp();
        let closed = (1.0 - tss) / (ks * lai);

        let mut previous_err = f64::INFINITY;
        for alf in [1.0, 1e-1, 1e-2, 1e-3, 1e-4] {
            let quad = hotspot_integral(ks, ko, lai, alf);
            let err = (quad.sumint - closed).abs();
            assert!(err <= previous_err, "error grew at alf={alf}");
            previous_err = err;
        }
        assert!(previous_err < 1e-3 * closed);
    }

    #[test]
    fn test_shrinking_hotspot_approaches_disabled_hotspot() {
        let canopy = spherical_canopy(40.0, 20.0, 150.0);
        let (ks, ko, lai) = (canopy.ks, canopy.ko, 2.0);
        let disabled = hotspot_integral(ks, ko, lai, hotspot_alf(canopy.geometry.dso, 0.0, ks, ko));
        let mut previous_err = f64::INFINITY;
        for hotspot in [0.5, 0.1, 1e-2, 1e-3] {
            let alf = hotspot_alf(canopy.geometry.dso, hotspot, ks, ko);
            let err = (hotspot_integral(ks, ko, lai, alf).sumint - disabled.sumint).abs();
            assert!(err <= previous_err, "error grew at hotspot={hotspot}");
            previous_err = err;
        }
        assert!(previous_err < 1e-2 * disabled.sumint);
    }

    #[test]
    fn test_quadrature_without_hotspot_matches_product_of_gaps() {
        // alf -> infinity decorrelates the paths: sumint = J2(ks, ko, 1) scaled.
        let (ks, ko, lai): (f64, f64, f64) = (0.7, 0.5, 2.5);
        let quad = hotspot_integral(ks, ko, lai, NO_HOTSPOT_ALF);
        let k = (ks + ko) * lai;
        assert_relative_eq!(quad.sumint, (1.0 - (-k).exp()) / k, max_relative = 1e-9);
        assert_relative_eq!(quad.tsstoo, (-k).exp(), max_relative = 1e-9);
    }

    #[test]
    fn test_flat_quadrature_step_reports_zero() {
        // ks = ko = 0 makes every step 0/0.
        let quad = hotspot_integral(0.0, 0.0, 2.0, 1.0);
        assert_eq!(quad.sumint, 0.0);
        assert_eq!(quad.tsstoo, 1.0);
    }

    #[test]
    fn test_soil_coupling_floor_keeps_outputs_finite() {
        let canopy = spherical_canopy(30.0, 10.0, 0.0);
        let rsoil = 10.0;
        let r = four_sail_band(&canopy, 6.0, 0.05, LeafOptics::new(0.5, 0.49), rsoil);
        assert!(r.rdd * rsoil >= 1.0, "rdd = {}", r.rdd);
        for (name, v) in FourSailResult::FIELD_NAMES.iter().zip(r.to_array()) {
            assert!(v.is_finite(), "{name} = {v}");
        }
    }

    #[test]
    fn test_hotspot_raises_backscatter() {
        let canopy = spherical_canopy(30.0, 25.0, 0.0);
        let leaf = LeafOptics::new(0.1, 0.05);
        let with_hotspot = four_sail_band(&canopy, 3.0, 0.2, leaf, 0.15);
        let without = four_sail_band(&canopy, 3.0, 0.0, leaf, 0.15);
        assert!(with_hotspot.rsos > without.rsos);
        assert_eq!(with_hotspot.rsod, without.rsod);
    }

    #[test]
    fn test_black_leaves_have_no_canopy_reflectance() {
        let canopy = spherical_canopy(30.0, 10.0, 45.0);
        let r = four_sail_band(&canopy, 2.0, 0.05, LeafOptics::new(0.0, 0.0), 0.0);
        assert!(r.rdd.abs() < 1e-12);
        assert!(r.rso.abs() < 1e-12);
        assert!(r.rsot.abs() < 1e-12);
        assert!(r.tss > 0.0 && r.tss < 1.0);
    }

    #[test]
    fn test_cached_canopy_takes_precedence() {
        let cached = spherical_canopy(30.0, 10.0, 45.0);
        let other = campbell_ellipsoidal(20.0, DEFAULT_BINS);
        let picked = resolve_canopy(Some(&cached), Some(other.view()), 60.0, 0.0, 0.0);
        assert_eq!(picked.ok(), Some(cached));
        assert_eq!(resolve_canopy(Some(&cached), None, 0.0, 0.0, 0.0).ok(), Some(cached));
    }

    #[test]
    fn test_uncached_canopy_needs_lidf() {
        let lidf = campbell_ellipsoidal(57.0, DEFAULT_BINS);
        let built = resolve_canopy(None, Some(lidf.view()), 30.0, 10.0, 45.0);
        assert_eq!(built.ok(), Some(spherical_canopy(30.0, 10.0, 45.0)));
        assert!(matches!(
            resolve_canopy(None, None, 30.0, 10.0, 45.0),
            Err(SailError::EmptyLidf)
        ));
        let empty = Array1::<f64>::zeros(0);
        assert!(matches!(
            resolve_canopy(None, Some(empty.view()), 30.0, 10.0, 45.0),
            Err(SailError::EmptyLidf)
        ));
    }

    #[test]
    fn test_spectral_matches_band_kernel() {
        let lidf = campbell_ellipsoidal(57.0, DEFAULT_BINS);
        let rho = array![0.05, 0.1, 0.45];
        let tau = array![0.02, 0.05, 0.4];
        let rsoil = array![0.15];
        let spectra = four_sail_spectral(
            3.0,
            0.01,
            lidf.view(),
            30.0,
            0.0,
            0.0,
            rho.view(),
            tau.view(),
            rsoil.view(),
        )
        .unwrap();
        assert_eq!(spectra.len(), 3);

        let canopy = CanopyGeometry::new(30.0, 0.0, 0.0, lidf.view());
        for i in 0..3 {
            let band = four_sail_band(&canopy, 3.0, 0.01, LeafOptics::new(rho[i], tau[i]), 0.15);
            assert_eq!(spectra.get(i), Some(band));
        }
        assert_eq!(spectra.get(3), None);
    }

    #[test]
    fn test_spectral_rejects_bad_inputs() {
        let lidf = campbell_ellipsoidal(57.0, DEFAULT_BINS);
        let two = array![0.1, 0.2];
        let three = array![0.1, 0.2, 0.3];
        let empty = Array1::<f64>::zeros(0);
        let run = |lidf: ArrayView1<f64>, tau: ArrayView1<f64>| {
            four_sail_spectral(3.0, 0.01, lidf, 30.0, 0.0, 0.0, two.view(), tau, two.view())
        };
        assert!(matches!(
            run(lidf.view(), three.view()),
            Err(SailError::LengthMismatch { .. })
        ));
        assert!(matches!(run(empty.view(), two.view()), Err(SailError::EmptyLidf)));
    }

    #[test]
    fn test_result_array_order() {
        let r = FourSailResult::bare_soil(0.3);
        let values = r.to_array();
        let idx = |name: &str| FourSailResult::FIELD_NAMES.iter().position(|&n| n == name).unwrap();
        assert_eq!(values[idx("rsot")], 0.3);
        assert_eq!(values[idx("tsstoo")], 1.0);
        assert_eq!(values[idx("gammaso")], 0.0);
        assert_relative_eq!(r.canopy_reflectance(0.3), 0.3);
    }
}
