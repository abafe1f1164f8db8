//! # ordertrace
//!
//! Locate the **spectral orders** of an echelle spectrograph on a raw detector
//! image and describe each one as a polynomial trace.
//!
//! Given a flat-field or order-definition frame, `ordertrace` finds the bright
//! curved bands the orders leave on the detector, fits each band's vertical
//! position as a polynomial in column index, and reports the column range over
//! which that polynomial is valid. The traces anchor every later extraction
//! and wavelength-calibration step.
//!
//! ## Example
//!
//! ```no_run
//! use ordertrace::{trace_orders_from_path, TraceConfig};
//!
//! let config = TraceConfig {
//!     min_cluster: 2000,
//!     noise: 50.0,
//!     opower: 4,
//!     ..Default::default()
//! };
//!
//! let result = trace_orders_from_path("data/order_definition.tiff", &config).unwrap();
//! let coefficients = result.coefficients(); // (n_orders, opower + 1), highest degree first
//! let column_range = result.column_range(); // (n_orders, 2), half-open [start, end)
//! println!("Found {} orders", result.len());
//! # let _ = (coefficients, column_range);
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Validation**: parameters are checked once, up front
//! 2. **Background**: a vertical boxcar of `filter_size` rows models the
//!    smooth light under the orders
//! 3. **Clusters**: pixels brighter than `background + noise` are grouped
//!    into 4-connected clusters; clusters under `min_cluster` pixels are dropped
//! 4. **Traces**: each cluster's intensity-weighted column centroids are
//!    fitted with a degree-`opower` polynomial; fragments of one order cut
//!    by a dead column are merged when their curves meet across the gap
//!    (`merge_tolerance`); the column span, trimmed by `border_width`,
//!    becomes the valid range; traces are sorted top to bottom at the image
//!    mid-column
//!
//! Instrument settings files can be read with [`load_settings`]; manual
//! correction plugs in through the [`TraceEditor`] trait.

pub mod background;
pub mod clusters;
mod config;
mod error;
pub mod fit;
pub mod frame;
mod hooks;
pub mod merge;
mod orders;
mod trace;

pub use config::{load_settings, Connectivity, TraceConfig, TraceParams};
pub use error::{Result, TraceError};
pub use hooks::{KeepTraces, LogPlotter, TraceEditor, TracePlotter};
pub use orders::{trace_orders, trace_orders_dyn, trace_orders_with};
#[cfg(feature = "image")]
pub use orders::{trace_orders_from_image, trace_orders_from_path};
pub use trace::{ColumnRange, OrderTraces, Trace};
