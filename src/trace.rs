//! Order traces: the polynomial and column range describing one spectral order.

use ndarray::Array2;

use crate::error::TraceError;

/// Half-open interval `[start, end)` of columns over which a trace is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRange {
    pub start: usize,
    pub end: usize,
}

impl ColumnRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of valid columns.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, col: usize) -> bool {
        (self.start..self.end).contains(&col)
    }
}

/// One spectral order: row position as a polynomial in column index.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    /// Polynomial coefficients, highest degree first.
    pub coefficients: Vec<f64>,
    /// Columns over which the polynomial describes the order.
    pub column_range: ColumnRange,
}

impl Trace {
    pub fn new(coefficients: Vec<f64>, column_range: ColumnRange) -> Self {
        Self {
            coefficients,
            column_range,
        }
    }

    /// Polynomial degree (number of coefficients minus one).
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Row position of the order at column `x` (Horner, descending powers).
    pub fn row_at(&self, x: f64) -> f64 {
        polyval(&self.coefficients, x)
    }
}

/// Evaluate a polynomial stored highest degree first.
pub(crate) fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().fold(0.0, |acc, &c| acc * x + c)
}

/// Result of order tracing on one image.
#[derive(Debug, Clone)]
pub struct OrderTraces {
    /// Traces sorted by ascending row at [`reference_column`](Self::reference_column).
    pub traces: Vec<Trace>,

    /// Polynomial degree every trace was fitted with.
    pub degree: usize,

    /// Image height in pixels.
    pub image_rows: usize,

    /// Image width in pixels.
    pub image_columns: usize,

    /// Number of pixels above the detection threshold.
    pub num_signal_pixels: usize,

    /// Number of connected components before the size filters.
    pub num_clusters_raw: usize,

    /// Number of clusters that survived the size filters.
    pub num_clusters: usize,

    /// Clusters whose column span was trimmed away entirely by the border.
    pub num_trimmed: usize,

    /// Fragments folded into another trace by the merge pass.
    pub num_merged: usize,

    /// Clusters skipped because the polynomial fit was under-determined.
    pub fit_failures: Vec<TraceError>,
}

impl OrderTraces {
    /// Number of traced orders.
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Column at which traces are compared when ordering them.
    pub fn reference_column(&self) -> f64 {
        reference_column(self.image_columns)
    }

    /// Coefficient matrix, shape `(n_orders, degree + 1)`, highest degree first.
    pub fn coefficients(&self) -> Array2<f64> {
        let ncoef = self.degree + 1;
        Array2::from_shape_fn((self.traces.len(), ncoef), |(i, j)| {
            self.traces[i].coefficients[j]
        })
    }

    /// Column ranges, shape `(n_orders, 2)`, each row `[start, end)`.
    pub fn column_range(&self) -> Array2<usize> {
        Array2::from_shape_fn((self.traces.len(), 2), |(i, j)| {
            let r = self.traces[i].column_range;
            if j == 0 {
                r.start
            } else {
                r.end
            }
        })
    }
}

pub(crate) fn reference_column(image_columns: usize) -> f64 {
    image_columns as f64 / 2.0
}

/// Sort traces by their row at `ref_col`, breaking ties on the paired key.
pub(crate) fn sort_by_position<K: Ord + Copy>(items: &mut [(K, Trace)], ref_col: f64) {
    items.sort_by(|(ka, a), (kb, b)| {
        a.row_at(ref_col)
            .total_cmp(&b.row_at(ref_col))
            .then_with(|| ka.cmp(kb))
    });
}
