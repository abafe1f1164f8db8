//! Noise suppression: a vertical boxcar that models the smooth background
//! under the spectral orders.
//!
//! Each column is averaged over a window of `filter_size` rows. Rows near the
//! top and bottom edges borrow values by symmetric reflection
//! (`d c b a | a b c d | d c b a`), repeated as often as needed, so the
//! result always has the shape of the input and column indices stay aligned
//! with the original image.

use ndarray::{Array2, ArrayView2};

use crate::frame::clean;

/// Smooth every column of `image` with a boxcar of `size` rows.
///
/// The window for row `r` covers rows `[r - size/2, r - size/2 + size)`.
/// `size` must be at least 1; the validator guarantees it.
pub fn smooth_columns(image: ArrayView2<'_, f64>, size: usize) -> Array2<f64> {
    let (nrows, ncols) = image.dim();
    let mut smoothed = Array2::<f64>::zeros((nrows, ncols));
    if nrows == 0 || ncols == 0 || size == 0 {
        return smoothed;
    }

    let half = (size / 2) as isize;
    let ext_len = nrows + size - 1;
    let norm = 1.0 / size as f64;

    // Running sum over the reflected column, one column at a time
    let mut prefix = vec![0.0_f64; ext_len + 1];
    for (col, column) in image.columns().into_iter().enumerate() {
        for e in 0..ext_len {
            let row = reflect(e as isize - half, nrows);
            prefix[e + 1] = prefix[e] + clean(column[row]);
        }
        for row in 0..nrows {
            smoothed[[row, col]] = (prefix[row + size] - prefix[row]) * norm;
        }
    }
    smoothed
}

/// Map any integer index onto `[0, n)` by symmetric reflection about the edges.
fn reflect(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period) as usize;
    if m < n {
        m
    } else {
        2 * n - 1 - m
    }
}
