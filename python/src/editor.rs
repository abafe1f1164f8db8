use numpy::ndarray::{Array2, ArrayView2};
use numpy::{PyArray2, ToPyArray};
use pyo3::prelude::*;

use ordertrace::{ColumnRange, Trace, TraceEditor, TraceError};

/// A Python callable used as the manual trace editor.
///
/// Called as `editor(orders, column_range)` with the automatic result and
/// expected to return the replacement `(orders, column_range)` pair. Rows of
/// the returned arrays are paired up in order.
///
/// A failure inside the callable (or in reading its return value) is kept
/// so the caller can re-raise the original exception.
pub(crate) struct PyTraceEditor<'py> {
    callable: Bound<'py, PyAny>,
    degree: usize,
    error: Option<PyErr>,
}

impl<'py> PyTraceEditor<'py> {
    pub(crate) fn new(callable: Bound<'py, PyAny>, degree: usize) -> PyResult<Self> {
        if !callable.is_callable() {
            return Err(pyo3::exceptions::PyTypeError::new_err("editor must be callable"));
        }
        Ok(Self {
            callable,
            degree,
            error: None,
        })
    }

    /// The Python exception behind the last failed edit, if any.
    pub(crate) fn take_error(&mut self) -> Option<PyErr> {
        self.error.take()
    }

    fn call(&self, traces: Vec<Trace>) -> PyResult<Vec<Trace>> {
        let py = self.callable.py();
        let (orders, ranges) = to_numpy(py, &traces, self.degree);

        let returned = self.callable.call1((orders, ranges))?;
        let (orders, ranges): (Vec<Vec<f64>>, Vec<Vec<i64>>) = returned.extract()?;
        if orders.len() != ranges.len() {
            return Err(pyo3::exceptions::PyValueError::new_err(format!(
                "editor returned {} orders but {} column ranges",
                orders.len(),
                ranges.len()
            )));
        }

        orders
            .into_iter()
            .zip(ranges)
            .enumerate()
            .map(|(i, (coefficients, range))| {
                let [start, end] = range[..] else {
                    return Err(pyo3::exceptions::PyValueError::new_err(format!(
                        "column range {} must have 2 entries, got {}",
                        i,
                        range.len()
                    )));
                };
                if start < 0 || end < 0 {
                    return Err(pyo3::exceptions::PyValueError::new_err(format!(
                        "column range {i} is negative: [{start}, {end})"
                    )));
                }
                Ok(Trace::new(
                    coefficients,
                    ColumnRange::new(start as usize, end as usize),
                ))
            })
            .collect()
    }
}

impl TraceEditor for PyTraceEditor<'_> {
    fn edit(
        &mut self,
        _image: ArrayView2<'_, f64>,
        traces: Vec<Trace>,
    ) -> ordertrace::Result<Vec<Trace>> {
        self.call(traces).map_err(|e| {
            let message = e.to_string();
            self.error = Some(e);
            TraceError::Edit(message)
        })
    }
}

/// Pack traces into the `(float64[n, degree+1], int64[n, 2])` pair
/// returned to Python.
pub(crate) fn to_numpy<'py>(
    py: Python<'py>,
    traces: &[Trace],
    degree: usize,
) -> (Bound<'py, PyArray2<f64>>, Bound<'py, PyArray2<i64>>) {
    let orders = Array2::from_shape_fn((traces.len(), degree + 1), |(i, j)| {
        traces[i].coefficients.get(j).copied().unwrap_or(f64::NAN)
    });
    let ranges = Array2::from_shape_fn((traces.len(), 2), |(i, j)| {
        let r = traces[i].column_range;
        if j == 0 {
            r.start as i64
        } else {
            r.end as i64
        }
    });
    (orders.to_pyarray(py), ranges.to_pyarray(py))
}
