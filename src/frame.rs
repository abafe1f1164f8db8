//! Detector image inputs.
//!
//! The tracer works on `ndarray` views of `f64` pixels, shape `(rows, columns)`.
//! The helpers here accept the looser shapes callers tend to hold (dynamic
//! dimension arrays, nested rows, flat row-major buffers) and reject anything
//! that is not genuinely two-dimensional with [`TraceError::Type`].

use ndarray::{Array2, ArrayView2, ArrayViewD, Ix2};

use crate::error::{Result, TraceError};

/// View a dynamic-dimension array as a 2-D image.
pub fn as_image_2d<'a>(image: ArrayViewD<'a, f64>) -> Result<ArrayView2<'a, f64>> {
    let ndim = image.ndim();
    image.into_dimensionality::<Ix2>().map_err(|_| {
        TraceError::type_err(format!("image must be a 2-D array, got {ndim} dimension(s)"))
    })
}

/// Build an image from nested rows. Ragged rows are a type error.
pub fn image_from_rows(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let ncols = rows.first().map_or(0, Vec::len);
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != ncols) {
        return Err(TraceError::type_err(format!(
            "image rows must all have the same length: row 0 has {ncols} values, row {i} has {}",
            row.len()
        )));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    image_from_raw(flat, rows.len(), ncols)
}

/// Build an image from row-major pixel data.
pub fn image_from_raw(pixels: Vec<f64>, rows: usize, columns: usize) -> Result<Array2<f64>> {
    let len = pixels.len();
    Array2::from_shape_vec((rows, columns), pixels).map_err(|_| {
        let expected = match rows.checked_mul(columns) {
            Some(n) => n.to_string(),
            None => "overflow".to_string(),
        };
        TraceError::type_err(format!(
            "pixel data length ({len}) does not match rows*columns ({rows}x{columns}={expected})"
        ))
    })
}

/// Pixel value used by the pipeline: non-finite pixels count as 0.
#[inline]
pub(crate) fn clean(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Convert a decoded image file into detector pixels.
///
/// 16-bit and floating-point data keep their native range; colour images are
/// reduced to luma.
#[cfg(feature = "image")]
pub fn image_to_array(img: &image::DynamicImage) -> Array2<f64> {
    use image::{DynamicImage, GenericImageView};

    let (width, height) = img.dimensions();
    let luma = |r: f64, g: f64, b: f64| 0.2126 * r + 0.7152 * g + 0.0722 * b;
    let pixels: Vec<f64> = match img {
        DynamicImage::ImageLuma16(g) => g.as_raw().iter().map(|&v| v as f64).collect(),
        DynamicImage::ImageLumaA16(g) => g.pixels().map(|p| p.0[0] as f64).collect(),
        DynamicImage::ImageRgb16(rgb) => rgb
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                luma(r as f64, g as f64, b as f64)
            })
            .collect(),
        DynamicImage::ImageRgba16(rgba) => rgba
            .pixels()
            .map(|p| {
                let [r, g, b, _] = p.0;
                luma(r as f64, g as f64, b as f64)
            })
            .collect(),
        DynamicImage::ImageRgb32F(rgb) => rgb
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                luma(r as f64, g as f64, b as f64)
            })
            .collect(),
        DynamicImage::ImageRgba32F(rgba) => rgba
            .pixels()
            .map(|p| {
                let [r, g, b, _] = p.0;
                luma(r as f64, g as f64, b as f64)
            })
            .collect(),
        _ => img.to_luma8().as_raw().iter().map(|&v| v as f64).collect(),
    };

    // DynamicImage buffers are row-major with exactly width*height luma samples
    Array2::from_shape_fn((height as usize, width as usize), |(r, c)| {
        pixels[r * width as usize + c]
    })
}
