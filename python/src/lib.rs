//! Python bindings for ordertrace via PyO3.
//!
//! Exposes echelle order tracing to Python as the `ordertrace` module.

mod editor;
mod image;

use numpy::PyArray2;
use pyo3::prelude::*;

use ordertrace::{
    trace_orders_with, Connectivity, KeepTraces, LogPlotter, TraceConfig, TraceError,
};

use crate::editor::{to_numpy, PyTraceEditor};
use crate::image::image_to_f64;

fn to_py_err(err: TraceError) -> PyErr {
    match err {
        TraceError::Type(msg) => pyo3::exceptions::PyTypeError::new_err(msg),
        TraceError::Value(msg) => pyo3::exceptions::PyValueError::new_err(msg),
        other => pyo3::exceptions::PyRuntimeError::new_err(other.to_string()),
    }
}

/// Trace the spectral orders of an echelle order-definition frame.
///
/// Args:
///     im: 2D numpy array (rows x columns). float64, float32, int64, int32,
///         int16, uint16 and uint8 are accepted.
///     min_cluster: Minimum number of pixels in a cluster. Default 500.
///     filter_size: Rows in the vertical background boxcar. Default 120.
///     noise: Signal threshold above the smoothed background. Default 8.0.
///     opower: Polynomial degree of each trace. Default 4.
///     border_width: Columns trimmed from both ends of each range. Default 5.
///     manual: Hand the automatic traces to `editor` before returning.
///     plot: Log a per-order summary.
///     editor: Callable `(orders, column_range) -> (orders, column_range)`.
///         Only used with manual=True.
///     min_width: Minimum column span of a cluster. Default 0.
///     connectivity: 4 or 8. Default 4.
///     merge_tolerance: Rows within which fragments of one order split by a
///         gap must agree to be merged. 0 disables merging. Default 1.0.
///
/// Returns:
///     (orders, column_range): float64 array (n, opower + 1) of polynomial
///     coefficients, highest degree first, and int64 array (n, 2) of
///     half-open column ranges. Orders are sorted top to bottom.
#[pyfunction]
#[pyo3(signature = (
    im,
    min_cluster = 500,
    filter_size = 120,
    noise = 8.0,
    opower = 4,
    border_width = 5,
    manual = false,
    plot = false,
    editor = None,
    min_width = 0,
    connectivity = 4,
    merge_tolerance = 1.0,
))]
#[allow(clippy::too_many_arguments)]
fn mark_orders<'py>(
    py: Python<'py>,
    im: &Bound<'py, PyAny>,
    min_cluster: i64,
    filter_size: i64,
    noise: f64,
    opower: i64,
    border_width: i64,
    manual: bool,
    plot: bool,
    editor: Option<Bound<'py, PyAny>>,
    min_width: i64,
    connectivity: u8,
    merge_tolerance: f64,
) -> PyResult<(Bound<'py, PyArray2<f64>>, Bound<'py, PyArray2<i64>>)> {
    let connectivity = match connectivity {
        4 => Connectivity::Four,
        8 => Connectivity::Eight,
        other => {
            return Err(pyo3::exceptions::PyValueError::new_err(format!(
                "connectivity must be 4 or 8, got {}",
                other
            )))
        }
    };
    let config = TraceConfig {
        min_cluster,
        filter_size,
        noise,
        opower,
        border_width,
        manual,
        plot,
        min_width,
        connectivity,
        merge_tolerance,
    };
    let params = config.validate().map_err(to_py_err)?;

    let pixels = image_to_f64(im)?;
    let image = ordertrace::frame::as_image_2d(pixels.view()).map_err(to_py_err)?;

    let result = match editor {
        Some(callable) => {
            let mut editor = PyTraceEditor::new(callable, params.degree)?;
            trace_orders_with(image, &config, &mut editor, &mut LogPlotter)
                .map_err(|e| editor.take_error().unwrap_or_else(|| to_py_err(e)))?
        }
        None => {
            trace_orders_with(image, &config, &mut KeepTraces, &mut LogPlotter)
                .map_err(to_py_err)?
        }
    };

    Ok(to_numpy(py, &result.traces, result.degree))
}

/// ordertrace: echelle spectral order tracing
///
/// A Rust implementation of order-definition tracing for echelle
/// spectrographs, exposed to Python via PyO3.
#[pymodule]
#[pyo3(name = "ordertrace")]
fn ordertrace_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(mark_orders, m)?)?;
    Ok(())
}
