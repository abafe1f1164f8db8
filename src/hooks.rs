//! Post-processing hooks that run after the automatic tracing pass.
//!
//! A [`TraceEditor`] may replace the automatic traces when
//! [`TraceConfig::manual`](crate::TraceConfig::manual) is set, e.g. an
//! operator UI that inserts, deletes or corrects orders. A [`TracePlotter`]
//! receives the final result when [`TraceConfig::plot`](crate::TraceConfig::plot)
//! is set and must not influence what is returned.

use ndarray::ArrayView2;
use tracing::info;

use crate::error::Result;
use crate::trace::{OrderTraces, Trace};

/// Manual correction of automatically traced orders.
pub trait TraceEditor {
    /// Receive the automatic traces (sorted by position) and return the
    /// collection that should be reported instead.
    fn edit(&mut self, image: ArrayView2<'_, f64>, traces: Vec<Trace>) -> Result<Vec<Trace>>;
}

impl<F> TraceEditor for F
where
    F: FnMut(ArrayView2<'_, f64>, Vec<Trace>) -> Result<Vec<Trace>>,
{
    fn edit(&mut self, image: ArrayView2<'_, f64>, traces: Vec<Trace>) -> Result<Vec<Trace>> {
        self(image, traces)
    }
}

/// Editor that accepts the automatic traces unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepTraces;

impl TraceEditor for KeepTraces {
    fn edit(&mut self, _image: ArrayView2<'_, f64>, traces: Vec<Trace>) -> Result<Vec<Trace>> {
        Ok(traces)
    }
}

/// Display of the traced orders.
pub trait TracePlotter {
    fn plot(&mut self, image: ArrayView2<'_, f64>, result: &OrderTraces);
}

/// Plotter that writes a per-order summary to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPlotter;

impl TracePlotter for LogPlotter {
    fn plot(&mut self, image: ArrayView2<'_, f64>, result: &OrderTraces) {
        let (rows, cols) = image.dim();
        info!(
            "Traced {} orders on a {}x{} image (degree {})",
            result.len(),
            rows,
            cols,
            result.degree
        );
        let ref_col = result.reference_column();
        for (i, trace) in result.traces.iter().enumerate() {
            info!(
                "  order {:>3}: row {:8.2} at column {:.0}, columns [{}, {})",
                i,
                trace.row_at(ref_col),
                ref_col,
                trace.column_range.start,
                trace.column_range.end
            );
        }
    }
}
