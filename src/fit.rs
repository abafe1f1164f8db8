//! Trace fitting: per-column centroids of a cluster and the least-squares
//! polynomial through them.
//!
//! Centroids are weighted by the original (unsmoothed) pixel values so the
//! smoothing kernel does not bias the row positions. Columns are divided by
//! the image width before the Vandermonde matrix is built, which keeps the
//! system well conditioned for high degrees on wide detectors; the solved
//! coefficients are rescaled back to raw column units.

use nalgebra::{DMatrix, DVector};
use ndarray::ArrayView2;

use crate::clusters::Cluster;
use crate::config::TraceParams;
use crate::error::TraceError;
use crate::frame::clean;
use crate::trace::{polyval, ColumnRange, Trace};

/// Per-column intensity-weighted mean row of a cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct CentroidProfile {
    /// Columns covered by the cluster, ascending.
    pub columns: Vec<usize>,
    /// Centroid row for each entry of `columns`.
    pub rows: Vec<f64>,
}

impl CentroidProfile {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A cluster (or a chain of merged clusters) with its fitted polynomial,
/// before border trimming.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedCluster {
    /// Smallest id among the clusters folded into this one.
    pub id: usize,
    /// Lowest column covered.
    pub min_col: usize,
    /// Highest column covered (inclusive).
    pub max_col: usize,
    pub profile: CentroidProfile,
    /// Polynomial coefficients, highest degree first.
    pub coefficients: Vec<f64>,
}

impl FittedCluster {
    /// Row of the fitted polynomial at column `x`.
    pub fn row_at(&self, x: f64) -> f64 {
        polyval(&self.coefficients, x)
    }

    /// Trim the span by `border_width` and turn it into a trace.
    ///
    /// Returns `None` when the trim leaves no valid columns.
    pub fn into_trace(self, border_width: usize, image_columns: usize) -> Option<Trace> {
        let column_range = trimmed_range(self.min_col, self.max_col, border_width, image_columns);
        if column_range.is_empty() {
            return None;
        }
        Some(Trace::new(self.coefficients, column_range))
    }
}

/// Outcome of fitting one cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterFit {
    Fitted(FittedCluster),
    /// The profile could not constrain the polynomial.
    Failed(TraceError),
}

/// Build the centroid profile of `cluster` from the original image.
///
/// Negative pixel values carry no weight; a column whose weights sum to zero
/// falls back to the plain mean row of its pixels.
pub fn centroid_profile(cluster: &Cluster, image: ArrayView2<'_, f64>) -> CentroidProfile {
    let width = cluster.width();
    let mut sum_w = vec![0.0_f64; width];
    let mut sum_wr = vec![0.0_f64; width];
    let mut sum_r = vec![0.0_f64; width];
    let mut count = vec![0usize; width];

    for &(row, col) in &cluster.pixels {
        let k = col - cluster.min_col;
        let w = clean(image[[row, col]]).max(0.0);
        sum_w[k] += w;
        sum_wr[k] += w * row as f64;
        sum_r[k] += row as f64;
        count[k] += 1;
    }

    let mut columns = Vec::with_capacity(width);
    let mut rows = Vec::with_capacity(width);
    for k in 0..width {
        if count[k] == 0 {
            continue;
        }
        let centroid = if sum_w[k] > 0.0 {
            sum_wr[k] / sum_w[k]
        } else {
            sum_r[k] / count[k] as f64
        };
        columns.push(cluster.min_col + k);
        rows.push(centroid);
    }
    CentroidProfile { columns, rows }
}

/// Least-squares polynomial of `degree` through `(x, y)`, highest degree first.
///
/// `scale` normalises `x` before solving. Returns `None` when there are fewer
/// points than coefficients or the solve does not produce finite values.
pub fn fit_polynomial(x: &[f64], y: &[f64], degree: usize, scale: f64) -> Option<Vec<f64>> {
    let ncoef = degree + 1;
    let n = x.len().min(y.len());
    if n < ncoef {
        return None;
    }
    let scale = if scale > 0.0 { scale } else { 1.0 };

    let mut a_mat = DMatrix::<f64>::zeros(n, ncoef);
    let mut b_vec = DVector::<f64>::zeros(n);
    for i in 0..n {
        let u = x[i] / scale;
        let mut p = 1.0;
        for k in 0..ncoef {
            a_mat[(i, k)] = p;
            p *= u;
        }
        b_vec[i] = y[i];
    }

    let svd = a_mat.svd(true, true);
    let normalized = svd.solve(&b_vec, 1e-12).ok()?;

    // a_k u^k = a_k x^k / scale^k
    let mut coefficients: Vec<f64> = normalized
        .iter()
        .enumerate()
        .map(|(k, &a)| a / scale.powi(k as i32))
        .collect();
    if coefficients.iter().any(|c| !c.is_finite()) {
        return None;
    }
    coefficients.reverse();
    Some(coefficients)
}

/// Valid column range of the span `[min_col, max_col]` after trimming
/// `border_width` from both ends.
pub fn trimmed_range(
    min_col: usize,
    max_col: usize,
    border_width: usize,
    image_columns: usize,
) -> ColumnRange {
    let start = min_col.saturating_add(border_width).min(image_columns);
    let end = (max_col + 1)
        .saturating_sub(border_width)
        .min(image_columns);
    ColumnRange::new(start, end.max(start))
}

/// Profile and fit one cluster.
pub fn fit_cluster(
    cluster: &Cluster,
    image: ArrayView2<'_, f64>,
    params: &TraceParams,
) -> ClusterFit {
    let profile = centroid_profile(cluster, image);
    match fit_profile(&profile, params.degree, image.ncols() as f64) {
        Some(coefficients) => ClusterFit::Fitted(FittedCluster {
            id: cluster.id,
            min_col: cluster.min_col,
            max_col: cluster.max_col,
            profile,
            coefficients,
        }),
        None => ClusterFit::Failed(TraceError::Fit {
            cluster: cluster.id,
            degree: params.degree,
            points: profile.len(),
        }),
    }
}

pub(crate) fn fit_profile(
    profile: &CentroidProfile,
    degree: usize,
    scale: f64,
) -> Option<Vec<f64>> {
    let x: Vec<f64> = profile.columns.iter().map(|&c| c as f64).collect();
    fit_polynomial(&x, &profile.rows, degree, scale)
}
