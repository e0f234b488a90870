use pyo3::prelude::*;

pub mod batch;
pub mod error;
pub mod inversion;
pub mod jfunc;
pub mod lidf;
pub mod sail;
pub mod sun;
pub mod volscatt;

pub use error::SailError;
pub use sail::{
    four_sail_band, four_sail_spectral, CanopyGeometry, FourSailResult, FourSailSpectra,
    LeafOptics,
};

#[pymodule]
fn foursail(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    register_lidf_module(py_module)?;
    register_volscatt_module(py_module)?;
    register_jfunc_module(py_module)?;
    register_sail_module(py_module)?;
    register_sun_module(py_module)?;
    register_inversion_module(py_module)?;

    py_module.add("__doc__", "4SAIL canopy radiative transfer implemented in Rust.")?;

    Ok(())
}

fn register_lidf_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "lidf")?;
    submodule.add("__doc__", "Leaf inclination distribution functions.")?;
    submodule.add("DEFAULT_BINS", lidf::DEFAULT_BINS)?;
    submodule.add_function(wrap_pyfunction!(lidf::calc_lidf_verhoef, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(lidf::calc_lidf_campbell, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(lidf::calc_lidf_campbell_vec, &submodule)?)?;
    py_module.add_submodule(&submodule)?;
    Ok(())
}

fn register_volscatt_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "volscatt")?;
    submodule.add("__doc__", "Volume scattering and interception for one leaf angle.")?;
    submodule.add_function(wrap_pyfunction!(volscatt::volscatt_py, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(volscatt::volscatt_vec, &submodule)?)?;
    py_module.add_submodule(&submodule)?;
    Ok(())
}

fn register_jfunc_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "jfunc")?;
    submodule.add("__doc__", "Exponential integrals of the four-stream solution.")?;
    submodule.add_function(wrap_pyfunction!(jfunc::jfunc1_py, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(jfunc::jfunc2_py, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(jfunc::jfunc1_vec, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(jfunc::jfunc2_vec, &submodule)?)?;
    py_module.add_submodule(&submodule)?;
    Ok(())
}

fn register_sail_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "sail")?;
    submodule.add("__doc__", "4SAIL canopy reflectance: spectral, single-band and batched.")?;
    submodule.add_class::<sail::FourSailOutput>()?;
    submodule.add_class::<sail::FourSailBand>()?;
    submodule.add_class::<sail::PyCanopyGeometry>()?;
    submodule.add_function(wrap_pyfunction!(sail::four_sail, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(sail::four_sail_wl, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(
        sail::precompute_canopy_geometry,
        &submodule
    )?)?;
    submodule.add_function(wrap_pyfunction!(batch::four_sail_vec, &submodule)?)?;
    py_module.add_submodule(&submodule)?;
    Ok(())
}

fn register_sun_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "sun")?;
    submodule.add("__doc__", "Solar zenith and azimuth angles.")?;
    submodule.add_function(wrap_pyfunction!(sun::calc_sun_angles, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(sun::calc_sun_angles_vec, &submodule)?)?;
    py_module.add_submodule(&submodule)?;
    Ok(())
}

fn register_inversion_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "inversion")?;
    submodule.add("__doc__", "PROSAIL / PROSPECT inversion cost functions.")?;
    submodule.add_class::<inversion::ProsailInversion>()?;
    submodule.add_class::<inversion::ProspectInversion>()?;
    py_module.add_submodule(&submodule)?;
    Ok(())
}
