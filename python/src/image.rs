use numpy::ndarray::ArrayD;
use numpy::PyReadonlyArrayDyn;
use pyo3::prelude::*;

/// Convert a numpy array of any supported dtype to an owned f64 array.
///
/// Dimensionality is left alone; the tracer rejects anything that is not 2-D.
pub(crate) fn image_to_f64(image: &Bound<'_, PyAny>) -> PyResult<ArrayD<f64>> {
    let Ok(dtype) = image.getattr("dtype") else {
        let type_name = image.get_type().name()?;
        return Err(pyo3::exceptions::PyTypeError::new_err(format!(
            "im must be a numpy array, got '{}'",
            type_name
        )));
    };
    let kind: String = dtype.getattr("kind")?.extract()?;
    let itemsize: usize = dtype.getattr("itemsize")?.extract()?;

    match (kind.as_str(), itemsize) {
        ("f", 8) => {
            let arr: PyReadonlyArrayDyn<f64> = image.extract()?;
            Ok(arr.as_array().to_owned())
        }
        ("f", 4) => convert::<f32>(image),
        ("i", 8) => convert::<i64>(image),
        ("i", 4) => convert::<i32>(image),
        ("i", 2) => convert::<i16>(image),
        ("u", 2) => convert::<u16>(image),
        ("u", 1) => convert::<u8>(image),
        _ => {
            let dtype_str: String = dtype.str()?.extract()?;
            Err(pyo3::exceptions::PyTypeError::new_err(format!(
                "Unsupported image dtype '{}'. Expected float64, float32, int64, int32, \
                 int16, uint16, or uint8.",
                dtype_str,
            )))
        }
    }
}

fn convert<T>(image: &Bound<'_, PyAny>) -> PyResult<ArrayD<f64>>
where
    T: numpy::Element + Copy + AsF64,
{
    let arr: PyReadonlyArrayDyn<T> = image.extract()?;
    Ok(arr.as_array().mapv(AsF64::as_f64))
}

trait AsF64 {
    fn as_f64(self) -> f64;
}

macro_rules! impl_as_f64 {
    ($($t:ty),*) => {
        $(impl AsF64 for $t {
            fn as_f64(self) -> f64 {
                self as f64
            }
        })*
    };
}

impl_as_f64!(f32, i64, i32, i16, u16, u8);
