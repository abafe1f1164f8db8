//! Order tracing entry points.
//!
//! The pipeline runs four stages in sequence:
//! 1. Validate the configuration (and the image shape for dynamic inputs)
//! 2. Model the background with a vertical boxcar of `filter_size` rows
//! 3. Threshold at `background + noise`, label connected clusters and drop
//!    clusters smaller than `min_cluster`
//! 4. Fit a polynomial through each cluster's column centroids, rejoin
//!    fragments of one order split by a gap, trim each column span by
//!    `border_width` and sort the traces top to bottom
//!
//! Cluster fits run on the rayon thread pool; the final sort makes the result
//! independent of scheduling.
//!
//! # Example
//!
//! ```
//! use ndarray::Array2;
//! use ordertrace::{trace_orders, TraceConfig};
//!
//! let mut image = Array2::<f64>::from_elem((100, 100), 1.0);
//! image.slice_mut(ndarray::s![45..56, ..]).fill(100.0);
//!
//! let config = TraceConfig {
//!     opower: 1,
//!     border_width: 0,
//!     ..Default::default()
//! };
//! let result = trace_orders(image.view(), &config).unwrap();
//! assert_eq!(result.len(), 1);
//! assert!((result.traces[0].row_at(50.0) - 50.0).abs() < 1e-9);
//! ```

use ndarray::{ArrayView2, ArrayViewD};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::background::smooth_columns;
use crate::clusters::extract_clusters;
use crate::config::{TraceConfig, TraceParams};
use crate::error::{Result, TraceError};
use crate::fit::{fit_cluster, ClusterFit};
use crate::frame::as_image_2d;
use crate::hooks::{KeepTraces, LogPlotter, TraceEditor, TracePlotter};
use crate::merge::merge_fragments;
use crate::trace::{reference_column, sort_by_position, OrderTraces, Trace};

/// Trace the spectral orders of `image` (shape `(rows, columns)`).
///
/// With `config.manual` set the automatic traces are kept as they are (no
/// editor is attached); use [`trace_orders_with`] to supply one. With
/// `config.plot` set a summary is written to the log.
pub fn trace_orders(image: ArrayView2<'_, f64>, config: &TraceConfig) -> Result<OrderTraces> {
    trace_orders_with(image, config, &mut KeepTraces, &mut LogPlotter)
}

/// Trace orders on an array of unknown dimensionality.
///
/// Anything that is not two-dimensional is a [`TraceError::Type`].
pub fn trace_orders_dyn(image: ArrayViewD<'_, f64>, config: &TraceConfig) -> Result<OrderTraces> {
    let image = as_image_2d(image)?;
    trace_orders(image, config)
}

/// Trace orders, handing the automatic result to `editor` when
/// `config.manual` is set and to `plotter` when `config.plot` is set.
pub fn trace_orders_with(
    image: ArrayView2<'_, f64>,
    config: &TraceConfig,
    editor: &mut dyn TraceEditor,
    plotter: &mut dyn TracePlotter,
) -> Result<OrderTraces> {
    let params = config.validate()?;
    let mut result = trace_automatic(image, &params);

    if params.manual {
        let edited = editor.edit(image, std::mem::take(&mut result.traces))?;
        check_edited(&edited, params.degree, image.ncols())?;
        let mut keyed: Vec<(usize, Trace)> = edited.into_iter().enumerate().collect();
        sort_by_position(&mut keyed, result.reference_column());
        result.traces = keyed.into_iter().map(|(_, t)| t).collect();
        debug!("Manual edit returned {} traces", result.traces.len());
    }

    if params.plot {
        plotter.plot(image, &result);
    }
    Ok(result)
}

/// The automatic pass: everything except the hooks.
fn trace_automatic(image: ArrayView2<'_, f64>, params: &TraceParams) -> OrderTraces {
    let (nrows, ncols) = image.dim();

    let background = smooth_columns(image, params.filter_size);
    let extraction = extract_clusters(image, background.view(), params);

    let fits: Vec<ClusterFit> = extraction
        .clusters
        .par_iter()
        .map(|cluster| fit_cluster(cluster, image, params))
        .collect();

    let mut fitted = Vec::with_capacity(fits.len());
    let mut fit_failures = Vec::new();
    for fit in fits {
        match fit {
            ClusterFit::Fitted(cluster) => fitted.push(cluster),
            ClusterFit::Failed(err) => {
                debug!("Skipping cluster: {}", err);
                fit_failures.push(err);
            }
        }
    }
    if !fit_failures.is_empty() {
        warn!(
            "Skipped {} cluster(s) too narrow for a degree {} fit",
            fit_failures.len(),
            params.degree
        );
    }

    let (fitted, num_merged) =
        merge_fragments(fitted, params.merge_tolerance, params.degree, ncols as f64);

    let mut keyed: Vec<(usize, Trace)> = Vec::with_capacity(fitted.len());
    let mut num_trimmed = 0usize;
    for cluster in fitted {
        let id = cluster.id;
        match cluster.into_trace(params.border_width, ncols) {
            Some(trace) => keyed.push((id, trace)),
            None => {
                debug!("Cluster {} trimmed away by border_width={}", id, params.border_width);
                num_trimmed += 1;
            }
        }
    }

    sort_by_position(&mut keyed, reference_column(ncols));
    debug!(
        "Traced {} orders from {} clusters ({} merged, {} trimmed, {} fit failures)",
        keyed.len(),
        extraction.clusters.len(),
        num_merged,
        num_trimmed,
        fit_failures.len()
    );

    OrderTraces {
        traces: keyed.into_iter().map(|(_, t)| t).collect(),
        degree: params.degree,
        image_rows: nrows,
        image_columns: ncols,
        num_signal_pixels: extraction.num_signal_pixels,
        num_clusters_raw: extraction.num_clusters_raw,
        num_clusters: extraction.clusters.len(),
        num_trimmed,
        num_merged,
        fit_failures,
    }
}

/// Edited traces must still satisfy the output invariants.
fn check_edited(traces: &[Trace], degree: usize, image_columns: usize) -> Result<()> {
    for (i, trace) in traces.iter().enumerate() {
        if trace.coefficients.len() != degree + 1 {
            return Err(TraceError::Edit(format!(
                "trace {i} has {} coefficients, expected {}",
                trace.coefficients.len(),
                degree + 1
            )));
        }
        if trace.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(TraceError::Edit(format!("trace {i} has non-finite coefficients")));
        }
        let r = trace.column_range;
        if r.start > r.end || r.end > image_columns {
            return Err(TraceError::Edit(format!(
                "trace {i} has column range [{}, {}) outside [0, {image_columns}]",
                r.start, r.end
            )));
        }
    }
    Ok(())
}

/// Load an image file and trace its orders.
#[cfg(feature = "image")]
pub fn trace_orders_from_path(
    path: impl AsRef<std::path::Path>,
    config: &TraceConfig,
) -> anyhow::Result<OrderTraces> {
    use anyhow::Context;

    let img = image::open(path.as_ref())
        .with_context(|| format!("Failed to open image: {}", path.as_ref().display()))?;
    let result = trace_orders_from_image(&img, config)
        .with_context(|| format!("Failed to trace orders in {}", path.as_ref().display()))?;
    Ok(result)
}

/// Trace orders on an already-decoded image.
#[cfg(feature = "image")]
pub fn trace_orders_from_image(
    img: &image::DynamicImage,
    config: &TraceConfig,
) -> Result<OrderTraces> {
    let pixels = crate::frame::image_to_array(img);
    trace_orders(pixels.view(), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::ColumnRange;
    use ndarray::{s, Array2, ArrayD, IxDyn};

    fn band_image() -> Array2<f64> {
        let mut img = Array2::<f64>::from_elem((100, 100), 1.0);
        img.slice_mut(s![45..56, ..]).fill(100.0);
        img
    }

    fn simple_config() -> TraceConfig {
        TraceConfig {
            opower: 1,
            border_width: 0,
            manual: false,
            plot: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_simple_band() {
        let result = trace_orders(band_image().view(), &simple_config()).unwrap();
        assert_eq!(result.len(), 1);

        let coeffs = result.coefficients();
        assert_eq!(coeffs.dim(), (1, 2));
        assert!(coeffs[[0, 0]].abs() < 1e-8, "slope {}", coeffs[[0, 0]]);
        assert!(
            (coeffs[[0, 1]] - 50.0).abs() < 1e-8,
            "offset {}",
            coeffs[[0, 1]]
        );

        let ranges = result.column_range();
        assert_eq!(ranges.dim(), (1, 2));
        assert_eq!(ranges[[0, 0]], 0);
        assert_eq!(ranges[[0, 1]], 100);

        assert_eq!(result.num_signal_pixels, 11 * 100);
        assert!(result.fit_failures.is_empty());
    }

    #[test]
    fn test_dead_column_band_is_one_order() {
        let mut img = band_image();
        img.slice_mut(s![.., 50]).fill(1.0);
        let config = TraceConfig {
            min_cluster: 100,
            ..simple_config()
        };

        let result = trace_orders(img.view(), &config).unwrap();
        assert_eq!(result.num_clusters, 2);
        assert_eq!(result.num_merged, 1);
        assert_eq!(result.len(), 1);
        assert_eq!(result.traces[0].column_range, ColumnRange::new(0, 100));
        assert!((result.traces[0].row_at(50.0) - 50.0).abs() < 1e-8);

        // With merging disabled the two halves stay separate
        let config = TraceConfig {
            merge_tolerance: 0.0,
            ..config
        };
        let result = trace_orders(img.view(), &config).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.num_merged, 0);
        let ranges: Vec<ColumnRange> = result.traces.iter().map(|t| t.column_range).collect();
        assert!(ranges.contains(&ColumnRange::new(0, 50)));
        assert!(ranges.contains(&ColumnRange::new(51, 100)));
    }

    #[test]
    fn test_border_trim_applies_to_merged_span() {
        let mut img = band_image();
        img.slice_mut(s![.., 50]).fill(1.0);
        let config = TraceConfig {
            min_cluster: 100,
            border_width: 5,
            ..simple_config()
        };
        let result = trace_orders(img.view(), &config).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.traces[0].column_range, ColumnRange::new(5, 95));
    }

    #[test]
    fn test_validation_runs_before_work() {
        let img = band_image();
        let bad = [
            (
                TraceConfig {
                    filter_size: 0,
                    ..Default::default()
                },
                "value",
            ),
            (
                TraceConfig {
                    border_width: -1,
                    ..Default::default()
                },
                "value",
            ),
            (
                TraceConfig {
                    opower: -1,
                    ..Default::default()
                },
                "value",
            ),
            (
                TraceConfig {
                    opower: i64::MAX,
                    ..Default::default()
                },
                "value",
            ),
            (
                TraceConfig {
                    noise: f64::NAN,
                    ..Default::default()
                },
                "type",
            ),
        ];
        for (config, kind) in bad {
            let err = trace_orders(img.view(), &config).unwrap_err();
            match (kind, &err) {
                ("value", TraceError::Value(_)) | ("type", TraceError::Type(_)) => {}
                _ => panic!("expected {kind} error, got {err:?}"),
            }
        }
    }

    #[test]
    fn test_dyn_input_must_be_2d() {
        let cube = ArrayD::<f64>::zeros(IxDyn(&[10, 10, 2]));
        assert!(matches!(
            trace_orders_dyn(cube.view(), &TraceConfig::default()),
            Err(TraceError::Type(_))
        ));
        let img = band_image().into_dyn();
        let result = trace_orders_dyn(img.view(), &simple_config()).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_min_cluster_too_large_yields_empty_output() {
        let config = TraceConfig {
            min_cluster: 1101,
            ..simple_config()
        };
        let result = trace_orders(band_image().view(), &config).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.num_clusters_raw, 1);
        assert_eq!(result.coefficients().dim(), (0, 2));
        assert_eq!(result.column_range().dim(), (0, 2));
    }

    #[test]
    fn test_border_width_trims_range() {
        let config = TraceConfig {
            border_width: 7,
            ..simple_config()
        };
        let result = trace_orders(band_image().view(), &config).unwrap();
        assert_eq!(result.traces[0].column_range, ColumnRange::new(7, 93));

        let config = TraceConfig {
            border_width: 50,
            ..simple_config()
        };
        let result = trace_orders(band_image().view(), &config).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.num_trimmed, 1);
    }

    #[test]
    fn test_underdetermined_fit_is_skipped() {
        // A 3-column blob cannot constrain a degree-4 polynomial
        let mut img = Array2::<f64>::from_elem((40, 40), 1.0);
        img.slice_mut(s![10..20, 5..8]).fill(100.0);
        img.slice_mut(s![28..32, ..]).fill(100.0);
        let config = TraceConfig {
            min_cluster: 10,
            opower: 4,
            border_width: 0,
            ..Default::default()
        };
        let result = trace_orders(img.view(), &config).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.fit_failures.len(), 1);
        assert!(matches!(
            result.fit_failures[0],
            TraceError::Fit {
                degree: 4,
                points: 3,
                ..
            }
        ));
        assert!((result.traces[0].row_at(20.0) - 29.5).abs() < 1e-6);
    }

    #[test]
    fn test_manual_editor_replaces_traces() {
        let config = TraceConfig {
            manual: true,
            ..simple_config()
        };
        let mut seen = 0usize;
        let mut editor = |_img: ArrayView2<'_, f64>, traces: Vec<Trace>| -> Result<Vec<Trace>> {
            seen = traces.len();
            let mut out = traces;
            // Operator adds an order above the detected one
            out.push(Trace::new(vec![0.0, 10.0], ColumnRange::new(20, 80)));
            Ok(out)
        };
        let result =
            trace_orders_with(band_image().view(), &config, &mut editor, &mut LogPlotter).unwrap();
        assert_eq!(seen, 1);
        assert_eq!(result.len(), 2);
        // Re-sorted top to bottom
        assert!((result.traces[0].row_at(50.0) - 10.0).abs() < 1e-12);
        assert!((result.traces[1].row_at(50.0) - 50.0).abs() < 1e-8);
    }

    #[test]
    fn test_editor_not_called_without_manual() {
        let mut called = false;
        let mut editor = |_img: ArrayView2<'_, f64>, _traces: Vec<Trace>| -> Result<Vec<Trace>> {
            called = true;
            Ok(Vec::new())
        };
        let img = band_image();
        let result =
            trace_orders_with(img.view(), &simple_config(), &mut editor, &mut LogPlotter).unwrap();
        assert!(!called);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_editor_output_is_checked() {
        let img = band_image();
        let config = TraceConfig {
            manual: true,
            ..simple_config()
        };
        let mut wrong_degree = |_img: ArrayView2<'_, f64>, _t: Vec<Trace>| -> Result<Vec<Trace>> {
            Ok(vec![Trace::new(vec![1.0, 2.0, 3.0], ColumnRange::new(0, 10))])
        };
        assert!(matches!(
            trace_orders_with(img.view(), &config, &mut wrong_degree, &mut LogPlotter),
            Err(TraceError::Edit(_))
        ));

        let mut out_of_bounds = |_img: ArrayView2<'_, f64>, _t: Vec<Trace>| -> Result<Vec<Trace>> {
            Ok(vec![Trace::new(vec![0.0, 2.0], ColumnRange::new(0, 101))])
        };
        assert!(matches!(
            trace_orders_with(img.view(), &config, &mut out_of_bounds, &mut LogPlotter),
            Err(TraceError::Edit(_))
        ));
    }

    #[test]
    fn test_plot_does_not_change_result() {
        struct Recorder(usize);
        impl TracePlotter for Recorder {
            fn plot(&mut self, _image: ArrayView2<'_, f64>, result: &OrderTraces) {
                self.0 += result.len();
            }
        }

        let img = band_image();
        let quiet = trace_orders(img.view(), &simple_config()).unwrap();
        let mut recorder = Recorder(0);
        let config = TraceConfig {
            plot: true,
            ..simple_config()
        };
        let plotted =
            trace_orders_with(img.view(), &config, &mut KeepTraces, &mut recorder).unwrap();
        assert_eq!(recorder.0, 1);
        assert_eq!(plotted.traces, quiet.traces);
    }

    #[test]
    fn test_empty_image() {
        let img = Array2::<f64>::zeros((0, 0));
        let result = trace_orders(img.view(), &TraceConfig::default()).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.coefficients().dim(), (0, 5));
    }
}
