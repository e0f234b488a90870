//! Cost functions for retrieving PROSAIL parameters from observed reflectance.
//!
//! A leaf optical model (PROSPECT or any substitute) supplies leaf
//! reflectance and transmittance per waveband; 4SAIL turns them into canopy
//! reflectance. The costs compare modelled to observed spectra and are meant
//! to be minimised by an external optimiser.

use std::str::FromStr;

use ndarray::{Array1, ArrayView1, Zip};
use ndarray_stats::DeviationExt;
use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::prelude::*;

use crate::error::SailError;
use crate::lidf::{LeafAngleDistribution, DEFAULT_BINS};
use crate::sail::{four_sail_band, CanopyGeometry, LeafOptics};

/// Retrievable PROSAIL parameters, in canonical order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProsailParam {
    NLeaf,
    Cab,
    Car,
    Cbrown,
    Cw,
    Cm,
    Lai,
    LeafAngle,
    Hotspot,
}

impl ProsailParam {
    /// Full PROSAIL parameter order.
    pub const ALL: [ProsailParam; 9] = [
        ProsailParam::NLeaf,
        ProsailParam::Cab,
        ProsailParam::Car,
        ProsailParam::Cbrown,
        ProsailParam::Cw,
        ProsailParam::Cm,
        ProsailParam::Lai,
        ProsailParam::LeafAngle,
        ProsailParam::Hotspot,
    ];

    /// Leaf-only (PROSPECT) parameter order.
    pub const LEAF: [ProsailParam; 6] = [
        ProsailParam::NLeaf,
        ProsailParam::Cab,
        ProsailParam::Car,
        ProsailParam::Cbrown,
        ProsailParam::Cw,
        ProsailParam::Cm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProsailParam::NLeaf => "N_leaf",
            ProsailParam::Cab => "Cab",
            ProsailParam::Car => "Car",
            ProsailParam::Cbrown => "Cbrown",
            ProsailParam::Cw => "Cw",
            ProsailParam::Cm => "Cm",
            ProsailParam::Lai => "LAI",
            ProsailParam::LeafAngle => "leaf_angle",
            ProsailParam::Hotspot => "hotspot",
        }
    }
}

impl FromStr for ProsailParam {
    type Err = SailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProsailParam::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| SailError::UnknownParameter(s.to_string()))
    }
}

/// Leaf biochemistry passed to the leaf optical model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeafBiochemistry {
    /// Leaf structure parameter
    pub n_leaf: f64,
    /// Chlorophyll a+b (µg/cm²)
    pub cab: f64,
    /// Carotenoids (µg/cm²)
    pub car: f64,
    /// Brown pigments (arbitrary units)
    pub cbrown: f64,
    /// Equivalent water thickness (g/cm²)
    pub cw: f64,
    /// Dry matter (g/cm²)
    pub cm: f64,
}

impl LeafBiochemistry {
    /// From values in [`ProsailParam::LEAF`] order.
    pub fn from_values(v: &[f64]) -> Result<Self, SailError> {
        if v.len() < ProsailParam::LEAF.len() {
            return Err(SailError::WrongCount {
                what: "leaf parameters",
                expected: ProsailParam::LEAF.len(),
                actual: v.len(),
            });
        }
        Ok(Self {
            n_leaf: v[0],
            cab: v[1],
            car: v[2],
            cbrown: v[3],
            cw: v[4],
            cm: v[5],
        })
    }
}

/// Full PROSAIL parameter set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProsailParameters {
    pub leaf: LeafBiochemistry,
    pub lai: f64,
    /// Mean leaf inclination angle (degrees) of a Campbell LIDF
    pub leaf_angle: f64,
    pub hotspot: f64,
}

impl ProsailParameters {
    /// From values in [`ProsailParam::ALL`] order.
    pub fn from_values(v: &[f64]) -> Result<Self, SailError> {
        if v.len() != ProsailParam::ALL.len() {
            return Err(SailError::WrongCount {
                what: "PROSAIL parameters",
                expected: ProsailParam::ALL.len(),
                actual: v.len(),
            });
        }
        Ok(Self {
            leaf: LeafBiochemistry::from_values(&v[..6])?,
            lai: v[6],
            leaf_angle: v[7],
            hotspot: v[8],
        })
    }
}

/// Which parameters are retrieved, and the values of the rest.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterLayout {
    order: &'static [ProsailParam],
    objective: Vec<ProsailParam>,
    fixed: Vec<f64>,
    bounds: Option<Vec<(f64, f64)>>,
}

impl ParameterLayout {
    /// `objective` names parameters of `order` to retrieve; `fixed` gives the
    /// remaining ones in `order`. Optional `bounds` (min, max) per objective
    /// parameter enable the scaled variants.
    pub fn new(
        order: &'static [ProsailParam],
        objective: &[String],
        fixed: Vec<f64>,
        bounds: Option<Vec<(f64, f64)>>,
    ) -> Result<Self, SailError> {
        let requested = objective
            .iter()
            .map(|name| {
                let param = name.parse::<ProsailParam>()?;
                if order.contains(&param) {
                    Ok(param)
                } else {
                    Err(SailError::UnknownParameter(name.clone()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let objective: Vec<ProsailParam> = order
            .iter()
            .copied()
            .filter(|p| requested.contains(p))
            .collect();

        let n_fixed = order.len() - objective.len();
        if fixed.len() != n_fixed {
            return Err(SailError::WrongCount {
                what: "fixed values",
                expected: n_fixed,
                actual: fixed.len(),
            });
        }
        if let Some(bounds) = &bounds {
            if bounds.len() != objective.len() {
                return Err(SailError::WrongCount {
                    what: "bounds",
                    expected: objective.len(),
                    actual: bounds.len(),
                });
            }
        }

        Ok(Self {
            order,
            objective,
            fixed,
            bounds,
        })
    }

    pub fn n_objective(&self) -> usize {
        self.objective.len()
    }

    /// Merge `x0` with the fixed values into a vector in canonical order.
    ///
    /// With `scaled`, each `x0[i]` is mapped from [0, 1] onto its bounds.
    pub fn assemble(&self, x0: &[f64], scaled: bool) -> Result<Vec<f64>, SailError> {
        if x0.len() != self.objective.len() {
            return Err(SailError::WrongCount {
                what: "objective values",
                expected: self.objective.len(),
                actual: x0.len(),
            });
        }
        let bounds = match (scaled, &self.bounds) {
            (false, _) => None,
            (true, Some(bounds)) => Some(bounds),
            (true, None) => {
                return Err(SailError::WrongCount {
                    what: "bounds",
                    expected: self.objective.len(),
                    actual: 0,
                })
            }
        };

        let mut objective_values = x0.iter().enumerate().map(|(i, &x)| match bounds {
            Some(b) => x * (b[i].1 - b[i].0) + b[i].0,
            None => x,
        });
        let mut fixed_values = self.fixed.iter().copied();

        // Both iterators hold exactly enough values after the length checks
        Ok(self
            .order
            .iter()
            .map(|p| {
                let value = if self.objective.contains(p) {
                    objective_values.next()
                } else {
                    fixed_values.next()
                };
                value.unwrap_or(f64::NAN)
            })
            .collect())
    }
}

// ── Leaf optical model seam ─────────────────────────────────────────────────

/// Leaf reflectance / transmittance for one waveband.
pub trait LeafOpticsModel {
    fn leaf_optics(&self, wl: f64, leaf: &LeafBiochemistry) -> Result<LeafOptics, SailError>;
}

/// Adapts a Python callable `f(wl, N, Cab, Car, Cbrown, Cw, Cm) -> (wl, rho, tau)`.
pub struct PyLeafModel<'py> {
    callable: Bound<'py, PyAny>,
}

impl<'py> PyLeafModel<'py> {
    pub fn new(callable: Bound<'py, PyAny>) -> Self {
        Self { callable }
    }
}

impl LeafOpticsModel for PyLeafModel<'_> {
    fn leaf_optics(&self, wl: f64, leaf: &LeafBiochemistry) -> Result<LeafOptics, SailError> {
        let (_, rho, tau): (f64, f64, f64) = self
            .callable
            .call1((wl, leaf.n_leaf, leaf.cab, leaf.car, leaf.cbrown, leaf.cw, leaf.cm))?
            .extract()?;
        Ok(LeafOptics::new(rho, tau))
    }
}

// ── Cost functions ──────────────────────────────────────────────────────────

/// Multi-angular canopy reflectance observations.
#[derive(Clone, Debug, PartialEq)]
pub struct CanopyObservations {
    /// Observed surface reflectance, observation-major, `n_obs * n_wl` values
    pub rho_canopy: Array1<f64>,
    /// View zenith per observation (degrees)
    pub vza: Array1<f64>,
    /// Sun zenith per observation (degrees)
    pub sza: Array1<f64>,
    /// Relative sun-view azimuth per observation (degrees)
    pub psi: Array1<f64>,
    /// Diffuse fraction of irradiance per observation
    pub skyl: Array1<f64>,
    /// Soil reflectance per waveband
    pub rsoil: Array1<f64>,
    /// Wavebands (nm)
    pub wls: Array1<f64>,
}

impl CanopyObservations {
    pub fn new(
        rho_canopy: Array1<f64>,
        vza: Array1<f64>,
        sza: Array1<f64>,
        psi: Array1<f64>,
        skyl: Array1<f64>,
        rsoil: Array1<f64>,
        wls: Array1<f64>,
    ) -> Result<Self, SailError> {
        let n_obs = vza.len();
        let n_wl = wls.len();
        let counts = [
            ("sza values", sza.len()),
            ("psi values", psi.len()),
            ("skyl values", skyl.len()),
        ];
        for (what, actual) in counts {
            if actual != n_obs {
                return Err(SailError::WrongCount {
                    what,
                    expected: n_obs,
                    actual,
                });
            }
        }
        if rsoil.len() != n_wl {
            return Err(SailError::WrongCount {
                what: "soil reflectances",
                expected: n_wl,
                actual: rsoil.len(),
            });
        }
        if rho_canopy.len() != n_obs * n_wl {
            return Err(SailError::WrongCount {
                what: "canopy reflectances",
                expected: n_obs * n_wl,
                actual: rho_canopy.len(),
            });
        }
        Ok(Self {
            rho_canopy,
            vza,
            sza,
            psi,
            skyl,
            rsoil,
            wls,
        })
    }

    pub fn n_obs(&self) -> usize {
        self.vza.len()
    }
}

/// Leaf optics for every waveband.
fn leaf_spectrum<M: LeafOpticsModel + ?Sized>(
    model: &M,
    wls: ArrayView1<f64>,
    leaf: &LeafBiochemistry,
) -> Result<Vec<LeafOptics>, SailError> {
    wls.iter().map(|&wl| model.leaf_optics(wl, leaf)).collect()
}

/// Modelled surface reflectance for every observation and waveband,
/// observation-major.
pub fn simulate_canopy<M: LeafOpticsModel + ?Sized>(
    model: &M,
    params: &ProsailParameters,
    obs: &CanopyObservations,
) -> Result<Array1<f64>, SailError> {
    let lidf = LeafAngleDistribution::campbell(params.leaf_angle, DEFAULT_BINS);
    let leaf = leaf_spectrum(model, obs.wls.view(), &params.leaf)?;

    let mut modelled = Vec::with_capacity(obs.rho_canopy.len());
    for i in 0..obs.n_obs() {
        let canopy = CanopyGeometry::new(obs.sza[i], obs.vza[i], obs.psi[i], lidf.masses());
        let skyl = obs.skyl[i];
        for (optics, &rsoil) in leaf.iter().zip(obs.rsoil.iter()) {
            let r = four_sail_band(&canopy, params.lai, params.hotspot, *optics, rsoil);
            modelled.push(r.canopy_reflectance(skyl));
        }
    }
    Ok(Array1::from_vec(modelled))
}

/// RMSE of observed vs. modelled surface reflectance.
pub fn prosail_rmse<M: LeafOpticsModel + ?Sized>(
    model: &M,
    params: &ProsailParameters,
    obs: &CanopyObservations,
) -> Result<f64, SailError> {
    let modelled = simulate_canopy(model, params, obs)?;
    log::debug!(
        "prosail_rmse: {} observations x {} wavebands",
        obs.n_obs(),
        obs.wls.len()
    );
    Ok(modelled.root_mean_sq_err(&obs.rho_canopy)?)
}

/// Modelled leaf reflectance per waveband.
pub fn simulate_leaf<M: LeafOpticsModel + ?Sized>(
    model: &M,
    leaf: &LeafBiochemistry,
    wls: ArrayView1<f64>,
) -> Result<Array1<f64>, SailError> {
    let spectrum = leaf_spectrum(model, wls, leaf)?;
    Ok(spectrum.iter().map(|o| o.rho).collect())
}

/// RMSE of observed vs. modelled leaf reflectance.
pub fn prospect_rmse<M: LeafOpticsModel + ?Sized>(
    model: &M,
    leaf: &LeafBiochemistry,
    wls: ArrayView1<f64>,
    rho_leaf: ArrayView1<f64>,
) -> Result<f64, SailError> {
    let modelled = simulate_leaf(model, leaf, wls)?;
    Ok(modelled.root_mean_sq_err(&rho_leaf)?)
}

/// Relative RMSE `sqrt(mean((obs - mod)^2 / obs))` of leaf reflectance.
pub fn prospect_rrmse<M: LeafOpticsModel + ?Sized>(
    model: &M,
    leaf: &LeafBiochemistry,
    wls: ArrayView1<f64>,
    rho_leaf: ArrayView1<f64>,
) -> Result<f64, SailError> {
    let modelled = simulate_leaf(model, leaf, wls)?;
    if modelled.len() != rho_leaf.len() {
        return Err(SailError::WrongCount {
            what: "leaf reflectances",
            expected: modelled.len(),
            actual: rho_leaf.len(),
        });
    }
    let relative = Zip::from(&rho_leaf)
        .and(&modelled)
        .map_collect(|&o, &m| (o - m).powi(2) / o);
    let mean = relative.mean().ok_or(SailError::NoResiduals)?;
    Ok(mean.sqrt())
}

// ── PyO3 wrappers ───────────────────────────────────────────────────────────

/// PROSPECT + 4SAIL inversion cost functions over canopy observations.
#[pyclass]
pub struct ProsailInversion {
    layout: ParameterLayout,
    observations: CanopyObservations,
    leaf_model: Py<PyAny>,
}

#[pymethods]
impl ProsailInversion {
    /// Parameters:
    /// - obj_param: Names of the parameters to retrieve
    ///   (subset of N_leaf, Cab, Car, Cbrown, Cw, Cm, LAI, leaf_angle, hotspot)
    /// - fixed_values: Values of the remaining parameters, in the same order
    /// - rho_canopy: Observed reflectance, n_obs * n_wl values, observation-major
    /// - vza, sza, psi, skyl: Per-observation geometry and diffuse fraction
    /// - rsoil: Soil reflectance per waveband
    /// - wls: Wavebands
    /// - leaf_model: Callable f(wl, N, Cab, Car, Cbrown, Cw, Cm) -> (wl, rho, tau)
    /// - bounds: Optional (min, max) per retrieved parameter for the scaled cost
    #[new]
    #[pyo3(signature = (obj_param, fixed_values, rho_canopy, vza, sza, psi, skyl, rsoil, wls, leaf_model, bounds=None))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        obj_param: Vec<String>,
        fixed_values: Vec<f64>,
        rho_canopy: PyReadonlyArray1<f64>,
        vza: PyReadonlyArray1<f64>,
        sza: PyReadonlyArray1<f64>,
        psi: PyReadonlyArray1<f64>,
        skyl: PyReadonlyArray1<f64>,
        rsoil: PyReadonlyArray1<f64>,
        wls: PyReadonlyArray1<f64>,
        leaf_model: Py<PyAny>,
        bounds: Option<Vec<(f64, f64)>>,
    ) -> PyResult<Self> {
        let layout = ParameterLayout::new(&ProsailParam::ALL, &obj_param, fixed_values, bounds)?;
        let observations = CanopyObservations::new(
            rho_canopy.as_array().to_owned(),
            vza.as_array().to_owned(),
            sza.as_array().to_owned(),
            psi.as_array().to_owned(),
            skyl.as_array().to_owned(),
            rsoil.as_array().to_owned(),
            wls.as_array().to_owned(),
        )?;
        Ok(Self {
            layout,
            observations,
            leaf_model,
        })
    }

    /// RMSE for parameter values `x0` in physical units.
    fn rmse(&self, py: Python<'_>, x0: Vec<f64>) -> PyResult<f64> {
        Ok(self.cost(py, &x0, false)?)
    }

    /// RMSE for `x0` scaled to [0, 1] within the bounds.
    fn rmse_scaled(&self, py: Python<'_>, x0: Vec<f64>) -> PyResult<f64> {
        Ok(self.cost(py, &x0, true)?)
    }

    /// Modelled surface reflectance (observation-major) for `x0`.
    #[pyo3(signature = (x0, scaled=false))]
    fn simulate<'py>(
        &self,
        py: Python<'py>,
        x0: Vec<f64>,
        scaled: bool,
    ) -> PyResult<Bound<'py, PyArray1<f64>>> {
        let params = ProsailParameters::from_values(&self.layout.assemble(&x0, scaled)?)?;
        let model = PyLeafModel::new(self.leaf_model.bind(py).clone());
        let modelled = simulate_canopy(&model, &params, &self.observations)?;
        Ok(PyArray1::from_owned_array(py, modelled))
    }

    #[getter]
    fn n_obs(&self) -> usize {
        self.observations.n_obs()
    }

    #[getter]
    fn n_objective(&self) -> usize {
        self.layout.n_objective()
    }
}

impl ProsailInversion {
    fn cost(&self, py: Python<'_>, x0: &[f64], scaled: bool) -> Result<f64, SailError> {
        let params = ProsailParameters::from_values(&self.layout.assemble(x0, scaled)?)?;
        let model = PyLeafModel::new(self.leaf_model.bind(py).clone());
        prosail_rmse(&model, &params, &self.observations)
    }
}

/// Leaf-only (PROSPECT) inversion cost functions.
#[pyclass]
pub struct ProspectInversion {
    layout: ParameterLayout,
    rho_leaf: Array1<f64>,
    wls: Array1<f64>,
    leaf_model: Py<PyAny>,
}

#[pymethods]
impl ProspectInversion {
    /// Parameters:
    /// - obj_param: Names of the parameters to retrieve
    ///   (subset of N_leaf, Cab, Car, Cbrown, Cw, Cm)
    /// - fixed_values: Values of the remaining parameters, in the same order
    /// - rho_leaf: Observed leaf reflectance per waveband
    /// - wls: Wavebands
    /// - leaf_model: Callable f(wl, N, Cab, Car, Cbrown, Cw, Cm) -> (wl, rho, tau)
    /// - bounds: Optional (min, max) per retrieved parameter for the scaled costs
    #[new]
    #[pyo3(signature = (obj_param, fixed_values, rho_leaf, wls, leaf_model, bounds=None))]
    fn new(
        obj_param: Vec<String>,
        fixed_values: Vec<f64>,
        rho_leaf: PyReadonlyArray1<f64>,
        wls: PyReadonlyArray1<f64>,
        leaf_model: Py<PyAny>,
        bounds: Option<Vec<(f64, f64)>>,
    ) -> PyResult<Self> {
        let layout = ParameterLayout::new(&ProsailParam::LEAF, &obj_param, fixed_values, bounds)?;
        let rho_leaf = rho_leaf.as_array().to_owned();
        let wls = wls.as_array().to_owned();
        if rho_leaf.len() != wls.len() {
            return Err(SailError::WrongCount {
                what: "leaf reflectances",
                expected: wls.len(),
                actual: rho_leaf.len(),
            }
            .into());
        }
        Ok(Self {
            layout,
            rho_leaf,
            wls,
            leaf_model,
        })
    }

    /// RMSE for parameter values `x0` in physical units.
    fn rmse(&self, py: Python<'_>, x0: Vec<f64>) -> PyResult<f64> {
        let leaf = self.leaf(&x0, false)?;
        let model = PyLeafModel::new(self.leaf_model.bind(py).clone());
        Ok(prospect_rmse(&model, &leaf, self.wls.view(), self.rho_leaf.view())?)
    }

    /// RMSE for `x0` scaled to [0, 1] within the bounds.
    fn rmse_scaled(&self, py: Python<'_>, x0: Vec<f64>) -> PyResult<f64> {
        let leaf = self.leaf(&x0, true)?;
        let model = PyLeafModel::new(self.leaf_model.bind(py).clone());
        Ok(prospect_rmse(&model, &leaf, self.wls.view(), self.rho_leaf.view())?)
    }

    /// Relative RMSE for `x0` scaled to [0, 1] within the bounds.
    fn rrmse_scaled(&self, py: Python<'_>, x0: Vec<f64>) -> PyResult<f64> {
        let leaf = self.leaf(&x0, true)?;
        let model = PyLeafModel::new(self.leaf_model.bind(py).clone());
        Ok(prospect_rrmse(&model, &leaf, self.wls.view(), self.rho_leaf.view())?)
    }
}

impl ProspectInversion {
    fn leaf(&self, x0: &[f64], scaled: bool) -> Result<LeafBiochemistry, SailError> {
        LeafBiochemistry::from_values(&self.layout.assemble(x0, scaled)?)
    }
}
